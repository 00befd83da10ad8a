//! Label selectors
//!
//! Matchers select requests by testing the enriched metadata against a
//! compiled selector: equality requirements plus set-based expressions.
//! The requirement count doubles as the selector's specificity, which is
//! the default matcher weight.

use crate::error::ConfigError;
use std::collections::BTreeMap;
use std::fmt;

/// Read view used for matching. Only string-valued entries participate.
pub trait Labels {
    fn has(&self, key: &str) -> bool;
    fn get(&self, key: &str) -> Option<&str>;
}

impl Labels for BTreeMap<String, String> {
    fn has(&self, key: &str) -> bool {
        self.contains_key(key)
    }

    fn get(&self, key: &str) -> Option<&str> {
        BTreeMap::get(self, key).map(String::as_str)
    }
}

/// Set-based requirement operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

impl Operator {
    fn parse(s: &str) -> Result<Self, ConfigError> {
        match s {
            "In" => Ok(Operator::In),
            "NotIn" => Ok(Operator::NotIn),
            "Exists" => Ok(Operator::Exists),
            "DoesNotExist" => Ok(Operator::DoesNotExist),
            other => Err(ConfigError::InvalidSelector(format!(
                "unknown operator {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::In => "In",
            Operator::NotIn => "NotIn",
            Operator::Exists => "Exists",
            Operator::DoesNotExist => "DoesNotExist",
        };
        f.write_str(s)
    }
}

/// Single compiled requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    key: String,
    op: Operator,
    values: Vec<String>,
}

impl Requirement {
    pub fn new(
        key: impl Into<String>,
        op: Operator,
        values: Vec<String>,
    ) -> Result<Self, ConfigError> {
        let key = key.into();
        if key.is_empty() {
            return Err(ConfigError::InvalidSelector("empty key".to_string()));
        }
        match op {
            Operator::In | Operator::NotIn if values.is_empty() => {
                return Err(ConfigError::InvalidSelector(format!(
                    "operator {} for key {:?} requires values",
                    op, key
                )));
            }
            Operator::Exists | Operator::DoesNotExist if !values.is_empty() => {
                return Err(ConfigError::InvalidSelector(format!(
                    "operator {} for key {:?} must not carry values",
                    op, key
                )));
            }
            _ => {}
        }
        Ok(Self { key, op, values })
    }

    fn matches(&self, labels: &dyn Labels) -> bool {
        match self.op {
            Operator::In => labels
                .get(&self.key)
                .map(|v| self.values.iter().any(|w| w == v))
                .unwrap_or(false),
            Operator::NotIn => labels
                .get(&self.key)
                .map(|v| !self.values.iter().any(|w| w == v))
                .unwrap_or(true),
            Operator::Exists => labels.has(&self.key),
            Operator::DoesNotExist => !labels.has(&self.key),
        }
    }
}

/// Compiled label selector. An empty selector matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    /// Selector that accepts every label set.
    pub fn everything() -> Self {
        Self::default()
    }

    /// Compile from equality labels plus set-based expressions.
    ///
    /// `expressions` come as `(key, operator, values)` triples in record
    /// form; operators are the usual `In`/`NotIn`/`Exists`/`DoesNotExist`.
    pub fn compile(
        match_labels: &BTreeMap<String, String>,
        expressions: &[(String, String, Vec<String>)],
    ) -> Result<Self, ConfigError> {
        let mut requirements = Vec::with_capacity(match_labels.len() + expressions.len());
        for (k, v) in match_labels {
            requirements.push(Requirement::new(k.clone(), Operator::In, vec![v.clone()])?);
        }
        for (key, op, values) in expressions {
            requirements.push(Requirement::new(
                key.clone(),
                Operator::parse(op)?,
                values.clone(),
            )?);
        }
        Ok(Self { requirements })
    }

    pub fn matches(&self, labels: &dyn Labels) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }

    /// Requirement count; the derived matcher weight.
    pub fn specificity(&self) -> usize {
        self.requirements.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn eq_selector(pairs: &[(&str, &str)]) -> Selector {
        Selector::compile(&labels(pairs), &[]).unwrap()
    }

    #[test]
    fn test_everything_matches() {
        let sel = Selector::everything();
        assert!(sel.matches(&labels(&[])));
        assert!(sel.matches(&labels(&[("os", "linux")])));
        assert_eq!(sel.specificity(), 0);
    }

    #[test]
    fn test_equality_match() {
        let sel = eq_selector(&[("os", "linux")]);
        assert!(sel.matches(&labels(&[("os", "linux"), ("arch", "amd64")])));
        assert!(!sel.matches(&labels(&[("os", "windows")])));
        assert!(!sel.matches(&labels(&[])));
    }

    #[test]
    fn test_set_expressions() {
        let sel = Selector::compile(
            &BTreeMap::new(),
            &[
                (
                    "arch".to_string(),
                    "In".to_string(),
                    vec!["amd64".to_string(), "arm64".to_string()],
                ),
                ("legacy".to_string(), "DoesNotExist".to_string(), vec![]),
            ],
        )
        .unwrap();

        assert!(sel.matches(&labels(&[("arch", "amd64")])));
        assert!(!sel.matches(&labels(&[("arch", "riscv")])));
        assert!(!sel.matches(&labels(&[("arch", "amd64"), ("legacy", "1")])));
        assert_eq!(sel.specificity(), 2);
    }

    #[test]
    fn test_not_in_without_key_matches() {
        let sel = Selector::compile(
            &BTreeMap::new(),
            &[(
                "os".to_string(),
                "NotIn".to_string(),
                vec!["windows".to_string()],
            )],
        )
        .unwrap();

        assert!(sel.matches(&labels(&[])));
        assert!(sel.matches(&labels(&[("os", "linux")])));
        assert!(!sel.matches(&labels(&[("os", "windows")])));
    }

    #[test]
    fn test_invalid_operator_rejected() {
        let err = Selector::compile(
            &BTreeMap::new(),
            &[("os".to_string(), "Matches".to_string(), vec![])],
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown operator"));
    }

    #[test]
    fn test_in_requires_values() {
        let err = Requirement::new("os", Operator::In, vec![]).unwrap_err();
        assert!(err.to_string().contains("requires values"));

        let err = Requirement::new("os", Operator::Exists, vec!["x".to_string()]).unwrap_err();
        assert!(err.to_string().contains("must not carry values"));
    }
}
