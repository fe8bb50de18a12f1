use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const NEGATION_PREFIX: char = '!';
pub const DEPENDENCY_PREFIX: char = '^';

/// One declared pattern token, exactly as the build system reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawToken {
    Text(String),
    Fileset {
        fileset: String,
    },
    Input {
        input: String,
        #[serde(default)]
        dependencies: bool,
    },
    /// Opaque build-system directive (`runtime`, `env`, `externalDependencies`...).
    Directive(serde_json::Map<String, serde_json::Value>),
}

impl From<&str> for RawToken {
    fn from(value: &str) -> Self {
        RawToken::Text(value.to_string())
    }
}

/// A raw token after classification against the group table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Glob { glob: String, negated: bool },
    Group(String),
    /// Group applied to every dependency root instead of the task's own.
    DependencyGroup(String),
    /// Carries no file-matching semantics.
    Directive,
}

impl Token {
    pub fn classify(raw: &RawToken, groups: &NamedGroupTable) -> Token {
        match raw {
            RawToken::Text(text) => {
                if let Some(name) = text.strip_prefix(DEPENDENCY_PREFIX) {
                    Token::DependencyGroup(name.to_string())
                } else if groups.contains(text) {
                    Token::Group(text.clone())
                } else {
                    glob_token(text)
                }
            }
            RawToken::Fileset { fileset } => glob_token(fileset),
            RawToken::Input {
                input,
                dependencies: true,
            } => Token::DependencyGroup(input.clone()),
            RawToken::Input { input, .. } => Token::Group(input.clone()),
            RawToken::Directive(_) => Token::Directive,
        }
    }
}

fn glob_token(text: &str) -> Token {
    match text.strip_prefix(NEGATION_PREFIX) {
        Some(glob) => Token::Glob {
            glob: glob.to_string(),
            negated: true,
        },
        None => Token::Glob {
            glob: text.to_string(),
            negated: false,
        },
    }
}

/// Workspace-global named groups of pattern tokens.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamedGroupTable(BTreeMap<String, Vec<RawToken>>);

impl NamedGroupTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<I, T>(&mut self, name: impl Into<String>, tokens: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<RawToken>,
    {
        self.0
            .insert(name.into(), tokens.into_iter().map(Into::into).collect());
    }

    pub fn get(&self, name: &str) -> Option<&[RawToken]> {
        self.0.get(name).map(Vec::as_slice)
    }

    /// Stored name and members of a group.
    pub fn entry(&self, name: &str) -> Option<(&str, &[RawToken])> {
        self.0
            .get_key_value(name)
            .map(|(key, tokens)| (key.as_str(), tokens.as_slice()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> NamedGroupTable {
        let mut t = NamedGroupTable::new();
        t.insert("production", ["{projectRoot}/src/**"]);
        t
    }

    #[test]
    fn classifies_string_tokens() {
        let t = table();
        assert_eq!(
            Token::classify(&"production".into(), &t),
            Token::Group("production".into())
        );
        assert_eq!(
            Token::classify(&"^production".into(), &t),
            Token::DependencyGroup("production".into())
        );
        assert_eq!(
            Token::classify(&"!{projectRoot}/**/*.spec.ts".into(), &t),
            Token::Glob {
                glob: "{projectRoot}/**/*.spec.ts".into(),
                negated: true
            }
        );
        assert_eq!(
            Token::classify(&"unknown-name".into(), &t),
            Token::Glob {
                glob: "unknown-name".into(),
                negated: false
            }
        );
    }

    #[test]
    fn deserializes_object_tokens() {
        let tokens: Vec<RawToken> = serde_json::from_str(
            r#"[
                {"fileset": "!{workspaceRoot}/tmp/**"},
                {"input": "production", "dependencies": true},
                {"input": "default"},
                {"runtime": "node --version"},
                {"externalDependencies": ["typescript"]}
            ]"#,
        )
        .unwrap();

        let t = table();
        let classified: Vec<Token> = tokens.iter().map(|r| Token::classify(r, &t)).collect();
        assert_eq!(
            classified,
            vec![
                Token::Glob {
                    glob: "{workspaceRoot}/tmp/**".into(),
                    negated: true
                },
                Token::DependencyGroup("production".into()),
                Token::Group("default".into()),
                Token::Directive,
                Token::Directive,
            ]
        );
    }

    #[test]
    fn table_deserializes_from_json_map() {
        let t: NamedGroupTable =
            serde_json::from_str(r#"{"default": ["{projectRoot}/**/*"], "production": ["default"]}"#)
                .unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.get("production"), Some(&[RawToken::from("default")][..]));
    }
}
