//! Global parameters that can be tuned through environment variables.
//!
//! A parameter is read once, on first access. If the environment variable is not set or cannot be
//! parsed, its default value is used.
//!
//! ```
//! use plankit_model::settings::EnvParam;
//! static MY_PARAM: EnvParam<u32> = EnvParam::new("PLANKIT_DOC_PARAM", "3");
//!
//! assert_eq!(MY_PARAM.get(), 3);
//! ```

use std::str::FromStr;

/// Maximal number of instances that a single quantifier expansion or action grounding may produce.
pub static PLANKIT_MAX_GROUNDINGS: EnvParam<usize> = EnvParam::new("PLANKIT_MAX_GROUNDINGS", "1000000");

/// If true, the simplifier replaces static fluents with constant arguments by their initial value.
pub static PLANKIT_SIMPLIFY_STATIC: EnvParam<bool> = EnvParam::new("PLANKIT_SIMPLIFY_STATIC", "true");

/// Number of ground actions kept in the cache of a simulator.
pub static PLANKIT_GROUNDING_CACHE: EnvParam<usize> = EnvParam::new("PLANKIT_GROUNDING_CACHE", "4096");

pub struct EnvParam<T> {
    value: once_cell::sync::OnceCell<T>,
    env: &'static str,
    default: &'static str,
}

impl<T> EnvParam<T> {
    pub const fn new(env: &'static str, default: &'static str) -> EnvParam<T> {
        EnvParam {
            value: once_cell::sync::OnceCell::new(),
            env,
            default,
        }
    }

    pub fn name(&self) -> &'static str {
        self.env
    }
}

impl<T: FromStr> EnvParam<T> {
    fn read_default(&self) -> T {
        match T::from_str(self.default) {
            Ok(v) => v,
            Err(_) => panic!("{}: invalid default value \"{}\"", self.env, self.default),
        }
    }

    pub fn get(&self) -> T
    where
        T: Copy,
    {
        *self.get_ref()
    }

    /// Returns the value of the parameter, reading it from the environment on the first call.
    ///
    /// # Panic
    /// If the default value cannot be parsed.
    pub fn get_ref(&self) -> &T {
        let read = || match std::env::var(self.env) {
            Ok(param) => match T::from_str(&param) {
                Ok(value) => {
                    tracing::debug!(param = self.env, value = %param, "read parameter from environment");
                    value
                }
                Err(_) => {
                    tracing::warn!(
                        param = self.env,
                        value = %param,
                        default = self.default,
                        "could not parse environment variable, using default"
                    );
                    self.read_default()
                }
            },
            Err(std::env::VarError::NotPresent) => self.read_default(),
            Err(err) => {
                tracing::warn!(param = self.env, default = self.default, "{err}, using default");
                self.read_default()
            }
        };
        self.value.get_or_init(read)
    }

    /// Forces the value of the parameter.
    ///
    /// Returns the value back if the parameter was already initialized (i.e. previously read).
    pub fn set(&self, value: T) -> Result<(), T> {
        self.value.set(value)
    }
}
