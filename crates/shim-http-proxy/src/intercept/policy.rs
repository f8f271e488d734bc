use crate::config::{ConfigError, StatusCheckConfig};
use hyper::{Method, StatusCode};
use std::collections::HashSet;

/// Which (status, method) pairs of an upstream response are eligible for mocking.
#[derive(Debug, Clone)]
pub struct StatusCheckPolicy {
    codes: HashSet<StatusCode>,
    methods: HashSet<Method>,
}

impl StatusCheckPolicy {
    pub fn new<C, M>(codes: C, methods: M) -> Self
    where
        C: IntoIterator<Item = StatusCode>,
        M: IntoIterator<Item = Method>,
    {
        Self {
            codes: codes.into_iter().collect(),
            methods: methods.into_iter().collect(),
        }
    }

    pub fn from_config(config: &StatusCheckConfig) -> Result<Self, ConfigError> {
        let codes = config
            .codes
            .iter()
            .map(|&code| {
                if (100..=599).contains(&code) {
                    StatusCode::from_u16(code).map_err(|_| ConfigError::InvalidStatusCode(code))
                } else {
                    Err(ConfigError::InvalidStatusCode(code))
                }
            })
            .collect::<Result<HashSet<_>, _>>()?;

        // Methods are case-insensitive in config; hyper's standard methods are upper-case
        let methods = config
            .methods
            .iter()
            .map(|m| {
                let upper = m.trim().to_ascii_uppercase();
                if upper.is_empty() {
                    return Err(ConfigError::InvalidMethod(m.clone()));
                }
                Method::from_bytes(upper.as_bytes()).map_err(|_| ConfigError::InvalidMethod(m.clone()))
            })
            .collect::<Result<HashSet<_>, _>>()?;

        Ok(Self { codes, methods })
    }

    /// `need_mock`: the status code and the method are both listed.
    pub fn needs_mock(&self, status: StatusCode, method: &Method) -> bool {
        self.codes.contains(&status) && self.methods.contains(method)
    }
}

impl Default for StatusCheckPolicy {
    fn default() -> Self {
        Self::new([StatusCode::NOT_FOUND], [Method::GET])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = StatusCheckPolicy::default();
        assert!(policy.needs_mock(StatusCode::NOT_FOUND, &Method::GET));
        assert!(!policy.needs_mock(StatusCode::NOT_FOUND, &Method::POST));
        assert!(!policy.needs_mock(StatusCode::OK, &Method::GET));
    }

    #[test]
    fn test_from_config_uppercases_methods() {
        let policy = StatusCheckPolicy::from_config(&StatusCheckConfig {
            codes: vec![404, 501],
            methods: vec!["get".to_string(), " Post ".to_string()],
        })
        .unwrap();
        assert!(policy.needs_mock(StatusCode::NOT_IMPLEMENTED, &Method::GET));
        assert!(policy.needs_mock(StatusCode::NOT_FOUND, &Method::POST));
        assert!(!policy.needs_mock(StatusCode::NOT_FOUND, &Method::DELETE));
    }

    #[test]
    fn test_from_config_rejects_invalid_values() {
        let bad_code = StatusCheckPolicy::from_config(&StatusCheckConfig {
            codes: vec![600],
            methods: vec!["GET".to_string()],
        });
        assert!(matches!(bad_code, Err(ConfigError::InvalidStatusCode(600))));

        let bad_method = StatusCheckPolicy::from_config(&StatusCheckConfig {
            codes: vec![404],
            methods: vec!["GE T".to_string()],
        });
        assert!(matches!(bad_method, Err(ConfigError::InvalidMethod(_))));
    }

    #[test]
    fn test_empty_policy_never_mocks() {
        let policy = StatusCheckPolicy::new([], []);
        assert!(!policy.needs_mock(StatusCode::NOT_FOUND, &Method::GET));
    }
}
