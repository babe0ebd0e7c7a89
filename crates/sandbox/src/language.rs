//! Supported languages and how to run / syntax-check each one.
//!
//! Command templates use `{file}` for the path of the source file inside the
//! sandbox.

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Language {
    pub id: &'static str,
    pub aliases: &'static [&'static str],
    /// Name of the source file written into the scratch dir.
    pub file_name: &'static str,
    /// Container image used by container providers.
    #[serde(skip)]
    pub image: &'static str,
    #[serde(skip)]
    pub run: &'static [&'static str],
    /// Syntax-only check; must not execute the program.
    #[serde(skip)]
    pub check: &'static [&'static str],
}

pub static LANGUAGES: &[Language] = &[
    Language {
        id: "python",
        aliases: &["py", "python3"],
        file_name: "main.py",
        image: "python:3.12-slim",
        run: &["python3", "{file}"],
        check: &["python3", "-m", "py_compile", "{file}"],
    },
    Language {
        id: "javascript",
        aliases: &["js", "node", "nodejs"],
        file_name: "main.js",
        image: "node:20-alpine",
        run: &["node", "{file}"],
        check: &["node", "--check", "{file}"],
    },
    Language {
        id: "typescript",
        aliases: &["ts", "deno"],
        file_name: "main.ts",
        image: "denoland/deno:alpine",
        run: &["deno", "run", "--no-prompt", "{file}"],
        check: &["deno", "check", "{file}"],
    },
    Language {
        id: "bash",
        aliases: &["sh", "shell"],
        file_name: "main.sh",
        image: "bash:5",
        run: &["bash", "{file}"],
        check: &["bash", "-n", "{file}"],
    },
    Language {
        id: "ruby",
        aliases: &["rb"],
        file_name: "main.rb",
        image: "ruby:3.3-alpine",
        run: &["ruby", "{file}"],
        check: &["ruby", "-c", "{file}"],
    },
    Language {
        id: "go",
        aliases: &["golang"],
        file_name: "main.go",
        image: "golang:1.22-alpine",
        run: &["go", "run", "{file}"],
        check: &["gofmt", "-e", "{file}"],
    },
];

/// Resolve an id or alias (case-insensitive).
pub fn lookup(name: &str) -> Option<&'static Language> {
    let name = name.trim().to_ascii_lowercase();
    LANGUAGES
        .iter()
        .find(|l| l.id == name || l.aliases.contains(&name.as_str()))
}

/// Expand a command template for a source file at `file`.
pub fn render(template: &[&str], file: &str) -> Vec<String> {
    template.iter().map(|part| part.replace("{file}", file)).collect()
}
