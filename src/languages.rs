//! Language and runtime tables for harness generation and container selection

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::EngineError;

/// Languages with a harness template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    JavaScript,
    Python,
    Go,
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "javascript" => Ok(Language::JavaScript),
            "python" => Ok(Language::Python),
            "go" => Ok(Language::Go),
            other => Err(format!("no harness for language {}", other)),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Language::JavaScript => "javascript",
            Language::Python => "python",
            Language::Go => "go",
        };
        write!(f, "{}", s)
    }
}

/// Configuration for a supported language
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    pub language: Language,
    /// Name of the generated harness file (e.g., "function.js")
    pub source_file: String,
    /// Build command (None for interpreted languages)
    pub compile_command: Option<Vec<String>>,
    /// Run command, executed in the workspace
    pub run_command: Vec<String>,
}

impl LanguageConfig {
    /// Entry command inside a container: build and run in one shell when needed
    pub fn container_command(&self) -> Vec<String> {
        match &self.compile_command {
            Some(compile) => vec![
                "sh".to_string(),
                "-c".to_string(),
                format!("{} && {}", compile.join(" "), self.run_command.join(" ")),
            ],
            None => self.run_command.clone(),
        }
    }
}

/// Diagnostic container command for a language without a harness.
///
/// Exits non-zero so the run surfaces as an execution failure.
pub fn unsupported_language_command(language: &str) -> Vec<String> {
    vec![
        "sh".to_string(),
        "-c".to_string(),
        "echo \"unsupported language: $0\" >&2; exit 1".to_string(),
        language.to_string(),
    ]
}

#[derive(Debug, Deserialize)]
struct RawCatalog {
    languages: HashMap<String, RawLanguageConfig>,
    #[serde(default)]
    images: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawLanguageConfig {
    source_file: String,
    compile_command: Option<String>,
    run_command: String,
    #[serde(default)]
    aliases: Vec<String>,
}

/// Immutable lookup tables, built once and shared by the strategies
#[derive(Debug, Clone)]
pub struct RuntimeCatalog {
    languages: HashMap<String, LanguageConfig>,
    images: HashMap<String, String>,
}

impl RuntimeCatalog {
    /// Catalog embedded in the binary
    pub fn builtin() -> Result<Self, EngineError> {
        let content = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/files/runtimes.toml"));
        Self::from_toml(content)
    }

    pub fn from_toml(content: &str) -> Result<Self, EngineError> {
        let raw: RawCatalog =
            toml::from_str(content).map_err(|e| EngineError::Catalog(e.to_string()))?;

        let mut languages = HashMap::new();
        for (name, raw_lang) in raw.languages {
            let language = name
                .to_lowercase()
                .parse::<Language>()
                .map_err(EngineError::Catalog)?;

            let run_command = into_command(&raw_lang.run_command);
            if run_command.is_empty() {
                return Err(EngineError::Catalog(format!(
                    "empty run command for {}",
                    name
                )));
            }

            let config = LanguageConfig {
                language,
                source_file: raw_lang.source_file,
                compile_command: raw_lang.compile_command.map(|cmd| into_command(&cmd)),
                run_command,
            };

            languages.insert(name.to_lowercase(), config.clone());
            for alias in raw_lang.aliases {
                languages.insert(alias.to_lowercase(), config.clone());
            }
        }

        let images = raw
            .images
            .into_iter()
            .map(|(tag, image)| (tag.to_lowercase(), image))
            .collect();

        Ok(Self { languages, images })
    }

    /// Language configuration by language tag or alias
    pub fn language(&self, tag: &str) -> Option<&LanguageConfig> {
        self.languages.get(&tag.trim().to_lowercase())
    }

    /// Container image for a runtime tag
    pub fn image(&self, runtime: &str) -> Option<&str> {
        self.images
            .get(&runtime.trim().to_lowercase())
            .map(String::as_str)
    }

    /// All accepted language tags, aliases included
    pub fn supported_languages(&self) -> Vec<String> {
        let mut names: Vec<String> = self.languages.keys().cloned().collect();
        names.sort();
        names
    }
}

fn into_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_catalog() -> &'static str {
        r#"
[languages.python]
source_file = "main.py"
run_command = "python3 main.py"
aliases = ["py", "python3"]

[languages.go]
source_file = "main.go"
compile_command = "go build -o app main.go"
run_command = "./app"

[images]
"python3.9" = "python:3.9-alpine"
"#
    }

    #[test]
    fn test_load_catalog() {
        let catalog = RuntimeCatalog::from_toml(test_catalog()).unwrap();

        let py = catalog.language("PY").unwrap();
        assert_eq!(py.language, Language::Python);
        assert_eq!(py.run_command, vec!["python3", "main.py"]);
        assert!(catalog.language("javascript").is_none());
        assert_eq!(catalog.image("python3.9"), Some("python:3.9-alpine"));
        assert_eq!(catalog.image("python2.7"), None);
    }

    #[test]
    fn test_container_command_chains_build() {
        let catalog = RuntimeCatalog::from_toml(test_catalog()).unwrap();
        let go = catalog.language("go").unwrap();
        assert_eq!(
            go.container_command(),
            vec!["sh", "-c", "go build -o app main.go && ./app"]
        );
        assert_eq!(
            catalog.language("python").unwrap().container_command(),
            vec!["python3", "main.py"]
        );
    }

    #[test]
    fn test_unknown_language_section_is_rejected() {
        let err = RuntimeCatalog::from_toml(
            r#"
[languages.cobol]
source_file = "main.cob"
run_command = "cobc main.cob"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Catalog(_)));
    }

    #[test]
    fn test_builtin_catalog() {
        let catalog = RuntimeCatalog::builtin().unwrap();
        for tag in ["javascript", "python", "go", "js", "golang"] {
            assert!(catalog.language(tag).is_some(), "missing {}", tag);
        }
        assert_eq!(catalog.image("nodejs18"), Some("node:18-alpine"));
        assert_eq!(catalog.image("go1.18"), Some("golang:1.19-alpine"));
        assert!(catalog.supported_languages().contains(&"python".to_string()));
    }

    #[test]
    fn test_unsupported_language_command_passes_tag_as_argument() {
        let cmd = unsupported_language_command("cobol; rm -rf /");
        assert_eq!(cmd[0], "sh");
        assert_eq!(cmd[3], "cobol; rm -rf /");
    }
}
