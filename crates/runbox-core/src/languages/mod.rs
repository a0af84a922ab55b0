//! Language recipes: from a language-tagged program to an engine request.
//!
//! Each supported language fixes an image, a shell command line, file
//! placement and a timeout; a couple of languages additionally rewrite the
//! designated main source file before upload (`modify_main`) or reshape the
//! result afterwards (`post_process`). The table is plain data plus those
//! two function pointers; resolution is pure, so equal requests always
//! produce equal engine requests.

use std::sync::Arc;

use serde::Deserialize;

use crate::engine::{Engine, EngineRequest, RunResult, SourceFile};
use crate::errors::EngineError;

/// Registry prefix for per-language images.
pub const IMAGE_REPOSITORY: &str = "ghcr.io/zetaoss/runcontainers";

/// A language-tagged program as submitted by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LanguageRequest {
    pub lang: String,
    pub files: Vec<InputFile>,
    /// Index of the main file, the one `modify_main` applies to.
    #[serde(default)]
    pub main: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InputFile {
    /// Empty means the language's default source-file name.
    #[serde(default)]
    pub name: String,
    pub body: String,
}

/// Per-request knobs layered over the language defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct Overrides {
    /// Requested run time in seconds; one extra second of grace is added.
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Bash,
    C,
    Cpp,
    Csharp,
    Java,
    Kotlin,
    Go,
    Lua,
    Mysql,
    Perl,
    Php,
    Powershell,
    Python,
    R,
    Ruby,
    Sqlite3,
    Tex,
}

impl Language {
    pub fn parse(lang: &str) -> Option<Language> {
        match lang {
            "bash" => Some(Language::Bash),
            "c" => Some(Language::C),
            "cpp" => Some(Language::Cpp),
            "csharp" => Some(Language::Csharp),
            "java" => Some(Language::Java),
            "kotlin" => Some(Language::Kotlin),
            "go" => Some(Language::Go),
            "lua" => Some(Language::Lua),
            "mysql" => Some(Language::Mysql),
            "perl" => Some(Language::Perl),
            "php" => Some(Language::Php),
            "powershell" => Some(Language::Powershell),
            "python" => Some(Language::Python),
            "r" => Some(Language::R),
            "ruby" => Some(Language::Ruby),
            "sqlite3" => Some(Language::Sqlite3),
            "tex" => Some(Language::Tex),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Language::Bash => "bash",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Csharp => "csharp",
            Language::Java => "java",
            Language::Kotlin => "kotlin",
            Language::Go => "go",
            Language::Lua => "lua",
            Language::Mysql => "mysql",
            Language::Perl => "perl",
            Language::Php => "php",
            Language::Powershell => "powershell",
            Language::Python => "python",
            Language::R => "r",
            Language::Ruby => "ruby",
            Language::Sqlite3 => "sqlite3",
            Language::Tex => "tex",
        }
    }

    pub fn all() -> &'static [Language] {
        &[
            Language::Bash,
            Language::C,
            Language::Cpp,
            Language::Csharp,
            Language::Java,
            Language::Kotlin,
            Language::Go,
            Language::Lua,
            Language::Mysql,
            Language::Perl,
            Language::Php,
            Language::Powershell,
            Language::Python,
            Language::R,
            Language::Ruby,
            Language::Sqlite3,
            Language::Tex,
        ]
    }
}

struct Recipe {
    command: String,
    shell: &'static str,
    file_ext: &'static str,
    file_name: &'static str,
    /// Subdirectory under the working directory, with leading slash.
    file_dir: &'static str,
    working_dir: &'static str,
    user: &'static str,
    env: Vec<String>,
    timeout_seconds: u64,
    collect_images_count: usize,
    modify_main: Option<fn(&str) -> String>,
    post_process: Option<fn(&mut RunResult)>,
}

fn recipe(lang: Language, files: &[InputFile]) -> Recipe {
    let mut r = Recipe {
        command: String::new(),
        shell: "sh",
        file_ext: lang.name(),
        file_name: "runbox",
        file_dir: "",
        working_dir: "/home/user01",
        user: "",
        env: Vec::new(),
        timeout_seconds: 10,
        collect_images_count: 2,
        modify_main: None,
        post_process: None,
    };
    match lang {
        Language::Bash => {
            r.command = "/bin/bash runbox.sh".to_string();
            r.file_ext = "sh";
            r.shell = "bash";
        }
        Language::C => r.command = "gcc runbox.c; ./a.out".to_string(),
        Language::Cpp => r.command = "g++ runbox.cpp; ./a.out".to_string(),
        Language::Csharp => {
            r.command = "mcs runbox.cs; mono runbox.exe".to_string();
            r.file_ext = "cs";
        }
        Language::Java => {
            r.command = r#"javac -d bin -cp "lib/*" src/*; java -cp "bin:lib/*" App"#.to_string();
            r.file_dir = "/src";
            r.file_name = "App";
            r.working_dir = "/demo";
        }
        Language::Kotlin => {
            r.command =
                "kotlinc runbox.kt -include-runtime -d runbox.jar && java -jar runbox.jar"
                    .to_string();
            r.file_ext = "kt";
            r.timeout_seconds = 40;
        }
        Language::Go => {
            r.command = "go run runbox.go".to_string();
            r.env = vec!["TINI_SUBREAPER=1".to_string()];
            r.timeout_seconds = 30;
        }
        Language::Lua => r.command = "lua runbox.lua".to_string(),
        Language::Mysql => {
            r.command = "bash /tmp/entrypoint.sh".to_string();
            r.file_ext = "sql";
            r.timeout_seconds = 30;
        }
        Language::Perl => {
            r.command = "perl runbox.pl".to_string();
            r.file_ext = "pl";
        }
        Language::Php => {
            r.command = "php runbox.php".to_string();
            r.modify_main = Some(prepend_php_preamble);
        }
        Language::Powershell => {
            r.command = "pwsh runbox.ps".to_string();
            r.file_ext = "ps";
        }
        Language::Python => {
            r.command = "python runbox.py".to_string();
            r.file_ext = "py";
        }
        Language::R => {
            r.command = "Rscript runbox.r".to_string();
            r.modify_main = Some(wrap_r_graphics);
        }
        Language::Ruby => {
            r.command = "ruby runbox.rb".to_string();
            r.file_ext = "rb";
        }
        Language::Sqlite3 => {
            r.file_ext = "sql";
            // Dot-commands run inline; SQL scripts are fed from the file.
            let source = &files[0].body;
            r.command = if source.starts_with('.') {
                format!("sqlite3 chinook.db {source}")
            } else {
                "sqlite3 -header chinook.db < runbox.sql".to_string()
            };
        }
        Language::Tex => {
            r.command =
                "touch oblivoir.sty && pdflatex -halt-on-error runbox.tex && convert runbox.pdf -strip p%d.png"
                    .to_string();
            r.file_ext = "tex";
            r.collect_images_count = 10;
            r.timeout_seconds = 30;
            r.user = "root";
            r.post_process = Some(suppress_logs_when_rendered);
        }
    }
    r
}

fn prepend_php_preamble(source: &str) -> String {
    let source = source.trim_start_matches([' ', '\t', '\n']);
    if source.starts_with("<?php") {
        source.to_string()
    } else {
        format!("<?php\nrequire_once('vendor/autoload.php');\n{source}")
    }
}

const R_EPILOGUE: &str = r#"options(echo=F); invisible(dev.off());system('find . -name "*.pdf" -exec mogrify -density 80 -format png {} \\;',ignore.stdout=T,ignore.stderr=F);"#;

fn wrap_r_graphics(source: &str) -> String {
    format!("png(width=500,height=400);\n{source}\n{R_EPILOGUE}")
}

fn suppress_logs_when_rendered(result: &mut RunResult) {
    if !result.images.is_empty() {
        result.logs.clear();
    }
}

/// Translate a language request into a fully-populated engine request plus
/// an optional result post-processing hook. User errors are returned before
/// any container work.
pub fn resolve(
    req: &LanguageRequest,
    overrides: Overrides,
) -> Result<(EngineRequest, Option<fn(&mut RunResult)>), EngineError> {
    if req.files.is_empty() {
        return Err(EngineError::NoFiles);
    }
    let lang = Language::parse(&req.lang).ok_or(EngineError::InvalidLanguage)?;
    let mut recipe = recipe(lang, &req.files);
    if let Some(seconds) = overrides.timeout_seconds {
        recipe.timeout_seconds = seconds + 1;
    }

    let mut files = Vec::with_capacity(req.files.len());
    for (i, file) in req.files.iter().enumerate() {
        let name = if file.name.is_empty() {
            format!("{}.{}", recipe.file_name, recipe.file_ext)
        } else {
            file.name.clone()
        };
        let body = match recipe.modify_main {
            Some(modify) if i == req.main => modify(&file.body),
            _ => file.body.clone(),
        };
        files.push(SourceFile::new(
            format!("{}{}/{}", recipe.working_dir, recipe.file_dir, name),
            body,
        ));
    }

    let engine_req = EngineRequest {
        image: format!("{IMAGE_REPOSITORY}/{}", lang.name()),
        shell: recipe.shell.to_string(),
        command: recipe.command,
        env: recipe.env,
        working_dir: recipe.working_dir.to_string(),
        user: recipe.user.to_string(),
        files,
        timeout_ms: recipe.timeout_seconds * 1000,
        collect_images: true,
        collect_images_count: recipe.collect_images_count,
        ..Default::default()
    };
    Ok((engine_req, recipe.post_process))
}

/// Runs language requests through the engine.
pub struct LangRunner {
    engine: Arc<Engine>,
}

impl LangRunner {
    pub fn new(engine: Arc<Engine>) -> Self {
        LangRunner { engine }
    }

    pub async fn run(
        &self,
        req: &LanguageRequest,
        overrides: Overrides,
    ) -> Result<RunResult, EngineError> {
        let (engine_req, post_process) = resolve(req, overrides)?;
        let mut result = self.engine.execute(engine_req).await?;
        if let Some(post_process) = post_process {
            post_process(&mut result);
        }
        Ok(result)
    }
}
