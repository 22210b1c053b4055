/// Declares the table of standard AGI environment variables.
///
/// Each entry pairs a variant with its name as stored in [`Environment`]
/// (prefix stripped). From that one table the macro derives:
/// - `as_str()`: the stripped name, which is also `Display` and `AsRef<str>`
/// - `wire_name()`: the name as Asterisk sends it, `agi_` included
/// - `ALL`: every variant in the order Asterisk emits them
/// - `FromStr`: case-insensitive, with or without the `agi_` prefix
///
/// [`Environment`]: crate::Environment
macro_rules! define_agi_variables {
    (
        error_type: $Err:ident,
        $(#[$enum_meta:meta])*
        $vis:vis enum $Name:ident {
            $(
                $(#[$var_meta:meta])*
                $variant:ident => $name:literal
            ),+ $(,)?
        }
    ) => {
        $(#[$enum_meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[non_exhaustive]
        #[allow(missing_docs)]
        $vis enum $Name {
            $(
                $(#[$var_meta])*
                $variant,
            )+
        }

        impl $Name {
            /// Every standard variable, in startup block order.
            pub const ALL: &'static [$Name] = &[$( $Name::$variant, )+];

            /// Name without the `agi_` prefix.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $Name::$variant => $name, )+
                }
            }

            /// Name as it appears on the wire, e.g. `agi_uniqueid`.
            pub fn wire_name(&self) -> &'static str {
                match self {
                    $( $Name::$variant => concat!("agi_", $name), )+
                }
            }
        }

        impl std::fmt::Display for $Name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl AsRef<str> for $Name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl std::str::FromStr for $Name {
            type Err = $Err;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let name = s
                    .strip_prefix($crate::constants::ENV_PREFIX)
                    .unwrap_or(s);
                $Name::ALL
                    .iter()
                    .copied()
                    .find(|var| name.eq_ignore_ascii_case(var.as_str()))
                    .ok_or_else(|| $Err(name.to_string()))
            }
        }
    };
}
