//! Supported languages and their fixed execution profiles

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Placeholder substituted with the directory holding the source file
const DIR_PLACEHOLDER: &str = "{dir}";

/// Supported programming languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Cpp,
    JavaScript,
    Java,
}

impl Language {
    /// All languages with a profile
    pub const ALL: [Language; 4] = [
        Language::Python,
        Language::Cpp,
        Language::JavaScript,
        Language::Java,
    ];

    /// The profile used to build and run this language
    pub fn profile(self) -> &'static LanguageProfile {
        match self {
            Language::Python => &PYTHON,
            Language::Cpp => &CPP,
            Language::JavaScript => &JAVASCRIPT,
            Language::Java => &JAVA,
        }
    }

    /// Canonical wire name
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Cpp => "cpp",
            Language::JavaScript => "javascript",
            Language::Java => "java",
        }
    }
}

impl std::str::FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "python" => Ok(Language::Python),
            "cpp" => Ok(Language::Cpp),
            "javascript" => Ok(Language::JavaScript),
            "java" => Ok(Language::Java),
            _ => Err(Error::UnsupportedLanguage(s.to_string())),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a language is built and run inside the sandbox
#[derive(Debug)]
pub struct LanguageProfile {
    pub language: Language,
    /// Isolation image
    pub image: &'static str,
    /// File name the toolchain expects the source under
    pub filename: &'static str,
    /// Run command; `{dir}` is replaced with the source directory
    command: &'static [&'static str],
    /// Extra environment for the sandboxed program
    pub env: &'static [(&'static str, &'static str)],
}

impl LanguageProfile {
    /// Run command with the source directory filled in
    pub fn command_in(&self, dir: &str) -> Vec<String> {
        self.command
            .iter()
            .map(|arg| arg.replace(DIR_PLACEHOLDER, dir))
            .collect()
    }
}

static PYTHON: LanguageProfile = LanguageProfile {
    language: Language::Python,
    image: "python:3",
    filename: "script.py",
    command: &["python", "{dir}/script.py"],
    env: &[("PYTHONUNBUFFERED", "1")],
};

// Build failures surface on the child's stderr, not as launch errors.
static CPP: LanguageProfile = LanguageProfile {
    language: Language::Cpp,
    image: "gcc",
    filename: "main.cpp",
    command: &["sh", "-c", "g++ {dir}/main.cpp -o {dir}/a.out && {dir}/a.out"],
    env: &[],
};

static JAVASCRIPT: LanguageProfile = LanguageProfile {
    language: Language::JavaScript,
    image: "node",
    filename: "script.js",
    command: &["node", "{dir}/script.js"],
    env: &[],
};

static JAVA: LanguageProfile = LanguageProfile {
    language: Language::Java,
    image: "openjdk",
    filename: "Main.java",
    command: &["sh", "-c", "javac {dir}/Main.java && java -cp {dir} Main"],
    env: &[],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_parsing() {
        assert_eq!("python".parse::<Language>().unwrap(), Language::Python);
        assert_eq!("CPP".parse::<Language>().unwrap(), Language::Cpp);
        assert_eq!("javascript".parse::<Language>().unwrap(), Language::JavaScript);
        assert_eq!("java".parse::<Language>().unwrap(), Language::Java);
    }

    #[test]
    fn test_unknown_language_rejected() {
        for name in ["ruby", "", "py", "c++"] {
            let err = name.parse::<Language>().unwrap_err();
            assert!(matches!(err, Error::UnsupportedLanguage(ref s) if s == name));
        }
    }

    #[test]
    fn test_every_language_has_one_profile() {
        for language in Language::ALL {
            let profile = language.profile();
            assert_eq!(profile.language, language);
            assert_eq!(language.to_string().parse::<Language>().unwrap(), language);
        }
    }

    #[test]
    fn test_command_templates() {
        assert_eq!(
            Language::Python.profile().command_in("/code"),
            vec!["python", "/code/script.py"]
        );
        assert_eq!(
            Language::Cpp.profile().command_in("/code"),
            vec!["sh", "-c", "g++ /code/main.cpp -o /code/a.out && /code/a.out"]
        );
        assert_eq!(
            Language::Java.profile().command_in("."),
            vec!["sh", "-c", "javac ./Main.java && java -cp . Main"]
        );
    }
}
