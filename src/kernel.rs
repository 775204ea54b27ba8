//! Sandbox kernel parameters.
//!
//! The builder is a replaceable strategy: the create path takes a
//! `Box<dyn KernelParamsBuilder>` and validates whatever it returns, so
//! builders stay simple policy objects.

use serde::{Deserialize, Serialize};

/// One `key=value` kernel command-line parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub key: String,
    pub value: String,
}

impl Param {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl std::fmt::Display for Param {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.value.is_empty() {
            write!(f, "{}", self.key)
        } else {
            write!(f, "{}={}", self.key, self.value)
        }
    }
}

/// Produces the kernel parameters for a new sandbox.
pub trait KernelParamsBuilder: Send + Sync {
    fn kernel_params(&self, container_id: &str) -> Vec<Param>;
}

/// Default policy: name the guest network interface after the container.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultKernelParams;

impl KernelParamsBuilder for DefaultKernelParams {
    fn kernel_params(&self, container_id: &str) -> Vec<Param> {
        vec![Param::new("ip", format!("::::::{}::off::", container_id))]
    }
}

impl<F> KernelParamsBuilder for F
where
    F: Fn(&str) -> Vec<Param> + Send + Sync,
{
    fn kernel_params(&self, container_id: &str) -> Vec<Param> {
        self(container_id)
    }
}

/// Parses a space separated kernel command line into params.
///
/// `key` without `=` yields an empty value; the split happens on the first
/// `=` only. Empty keys are kept so validation can reject them.
pub fn parse_kernel_params(cmdline: &str) -> Vec<Param> {
    cmdline
        .split_whitespace()
        .map(|token| match token.split_once('=') {
            Some((key, value)) => Param::new(key, value),
            None => Param::new(token, ""),
        })
        .collect()
}

/// Renders params back into a kernel command line.
pub fn format_kernel_params(params: &[Param]) -> String {
    params
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Returns the first param with an empty key, if any.
pub fn find_invalid_param(params: &[Param]) -> Option<&Param> {
    params.iter().find(|p| p.key.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_embed_container_id() {
        let params = DefaultKernelParams.kernel_params("abc");
        assert_eq!(params, vec![Param::new("ip", "::::::abc::off::")]);
        assert!(find_invalid_param(&params).is_none());
    }

    #[test]
    fn test_parse_kernel_params() {
        let params = parse_kernel_params("quiet  console=hvc0 a=b=c =x");
        assert_eq!(params[0], Param::new("quiet", ""));
        assert_eq!(params[1], Param::new("console", "hvc0"));
        assert_eq!(params[2], Param::new("a", "b=c"));
        assert_eq!(find_invalid_param(&params), Some(&Param::new("", "x")));
        assert_eq!(format_kernel_params(&params[..3]), "quiet console=hvc0 a=b=c");
    }

    #[test]
    fn test_closure_builder() {
        let builder = |_: &str| vec![Param::new("", "")];
        assert_eq!(builder.kernel_params("x").len(), 1);
    }
}
