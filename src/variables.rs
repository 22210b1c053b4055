//! Typed names for the standard AGI environment variables.

/// Error returned when parsing an unrecognized environment variable name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAgiVariableError(pub String);

impl std::fmt::Display for ParseAgiVariableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown AGI variable: {}", self.0)
    }
}

impl std::error::Error for ParseAgiVariableError {}

define_agi_variables! {
    error_type: ParseAgiVariableError,
    /// Variables Asterisk sends in the startup block, named without the
    /// `agi_` prefix. Script arguments (`arg_1`, `arg_2`, …) are open-ended
    /// and read through [`Environment::arg`](crate::Environment::arg) instead.
    ///
    /// Parsing accepts names with or without the prefix.
    pub enum AgiVariable {
        Request => "request",
        Channel => "channel",
        Language => "language",
        Type => "type",
        UniqueId => "uniqueid",
        Version => "version",
        CallerId => "callerid",
        CallerIdName => "calleridname",
        CallingPres => "callingpres",
        CallingAni2 => "callingani2",
        CallingTon => "callington",
        CallingTns => "callingtns",
        Dnid => "dnid",
        Rdnis => "rdnis",
        Context => "context",
        Extension => "extension",
        Priority => "priority",
        Enhanced => "enhanced",
        AccountCode => "accountcode",
        ThreadId => "threadid",
        Network => "network",
        NetworkScript => "network_script",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_unprefixed() {
        assert_eq!(AgiVariable::UniqueId.to_string(), "uniqueid");
        assert_eq!(AgiVariable::NetworkScript.to_string(), "network_script");
        let name: &str = AgiVariable::CallerIdName.as_ref();
        assert_eq!(name, "calleridname");
    }

    #[test]
    fn from_str_accepts_prefix_and_case() {
        assert_eq!("agi_channel".parse::<AgiVariable>(), Ok(AgiVariable::Channel));
        assert_eq!("CHANNEL".parse::<AgiVariable>(), Ok(AgiVariable::Channel));
        assert_eq!("dnid".parse::<AgiVariable>(), Ok(AgiVariable::Dnid));
    }

    #[test]
    fn wire_name_carries_prefix() {
        assert_eq!(AgiVariable::UniqueId.wire_name(), "agi_uniqueid");
        for var in AgiVariable::ALL {
            assert_eq!(
                var.wire_name()
                    .strip_prefix(crate::constants::ENV_PREFIX),
                Some(var.as_str())
            );
            assert_eq!(var.wire_name().parse::<AgiVariable>(), Ok(*var));
        }
    }

    #[test]
    fn all_is_in_startup_order() {
        assert_eq!(AgiVariable::ALL.len(), 22);
        assert_eq!(AgiVariable::ALL.first(), Some(&AgiVariable::Request));
        assert_eq!(AgiVariable::ALL.last(), Some(&AgiVariable::NetworkScript));
    }

    #[test]
    fn from_str_unknown() {
        let err = "agi_arg_1"
            .parse::<AgiVariable>()
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown AGI variable: arg_1");
    }
}
