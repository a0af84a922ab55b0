//! Image reference validation and tag normalization.
//!
//! Follows the canonical reference grammar closely enough for the engine's
//! needs: lowercase path components, an optional registry host (which may
//! carry a port), and an optional tag. Digest references are rejected; the
//! language router never produces them.

/// Validate `image` and return the `repo:tag` form used for the local image
/// presence check, appending `:latest` when no tag is given. Returns `None`
/// on a syntactically invalid reference.
pub(crate) fn normalize_reference(image: &str) -> Option<String> {
    if image.is_empty() || image.contains('@') {
        return None;
    }

    let (name, tag) = split_tag(image);
    if name.is_empty() {
        return None;
    }

    let mut components = name.split('/');
    let first = components.next()?;
    let rest: Vec<&str> = components.collect();
    if rest.is_empty() {
        if !valid_path_component(first) {
            return None;
        }
    } else {
        // The leading component may be a registry host instead of a
        // repository path component.
        if !valid_path_component(first) && !valid_registry_host(first) {
            return None;
        }
        if !rest.iter().all(|c| valid_path_component(c)) {
            return None;
        }
    }

    match tag {
        Some(tag) if !valid_tag(tag) => None,
        Some(_) => Some(image.to_string()),
        None => Some(format!("{image}:latest")),
    }
}

/// Split off a trailing tag. A colon only introduces a tag when it appears
/// after the last `/`, so registry ports are left alone.
fn split_tag(image: &str) -> (&str, Option<&str>) {
    match image.rfind(':') {
        Some(colon) if image.rfind('/').map_or(true, |slash| colon > slash) => {
            (&image[..colon], Some(&image[colon + 1..]))
        }
        _ => (image, None),
    }
}

fn valid_path_component(component: &str) -> bool {
    let bytes = component.as_bytes();
    let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    !bytes.is_empty()
        && alnum(bytes[0])
        && alnum(bytes[bytes.len() - 1])
        && bytes.iter().all(|&b| alnum(b) || matches!(b, b'.' | b'_' | b'-'))
}

fn valid_registry_host(host: &str) -> bool {
    let (name, port) = match host.split_once(':') {
        Some((name, port)) => (name, Some(port)),
        None => (host, None),
    };
    if let Some(port) = port {
        if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
    }
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-'))
}

fn valid_tag(tag: &str) -> bool {
    let bytes = tag.as_bytes();
    !bytes.is_empty()
        && bytes.len() <= 128
        && (bytes[0].is_ascii_alphanumeric() || bytes[0] == b'_')
        && bytes
            .iter()
            .all(|&b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_name_gets_latest() {
        assert_eq!(normalize_reference("a").as_deref(), Some("a:latest"));
        assert_eq!(normalize_reference("alpine").as_deref(), Some("alpine:latest"));
    }

    #[test]
    fn explicit_tag_is_kept() {
        assert_eq!(normalize_reference("alpine:3.19").as_deref(), Some("alpine:3.19"));
    }

    #[test]
    fn registry_paths() {
        assert_eq!(
            normalize_reference("ghcr.io/zetaoss/runcontainers/python").as_deref(),
            Some("ghcr.io/zetaoss/runcontainers/python:latest")
        );
        assert_eq!(
            normalize_reference("localhost:5000/app").as_deref(),
            Some("localhost:5000/app:latest")
        );
    }

    #[test]
    fn invalid_references() {
        for image in ["", ".", "-x", "x-", "Foo", "a//b", "a:b:c", "repo:", "a@sha256:deadbeef"] {
            assert!(normalize_reference(image).is_none(), "{image:?}");
        }
    }

    #[test]
    fn tag_charset() {
        assert!(normalize_reference("a:ok_tag-1.2").is_some());
        assert!(normalize_reference("a:bad tag").is_none());
        assert!(normalize_reference("a:-leading").is_none());
    }
}
