//! Environment-variable plumbing shared by the engine configs.

use std::env;
use std::fmt::Debug;
use std::str::FromStr;

/// Reads a configuration value from the environment.
///
/// Returns `None` when the variable is unset. A variable that is set but
/// does not parse is a configuration error and aborts with a diagnostic
/// rather than being silently ignored.
pub fn env_param<T>(name: &str) -> Option<T>
where
    T: FromStr,
    T::Err: Debug,
{
    match env::var(name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => panic!("{} must be an integer, got {:?}", name, raw),
        },
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::env_param;

    #[test]
    fn unset_is_none() {
        assert_eq!(env_param::<usize>("SMR_TEST_UNSET_VARIABLE"), None);
    }

    #[test]
    fn set_is_parsed() {
        std::env::set_var("SMR_TEST_SET_VARIABLE", "42");
        assert_eq!(env_param::<usize>("SMR_TEST_SET_VARIABLE"), Some(42));
        std::env::remove_var("SMR_TEST_SET_VARIABLE");
    }
}
