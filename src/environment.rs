//! AGI session environment
//!
//! Asterisk opens every session with a block of `agi_<name>: <value>` lines
//! terminated by an empty line. [`Environment`] is the parsed, immutable
//! form of that block.
//!
//! Construction contract:
//! - the `agi_` prefix is stripped from every key,
//! - values are right-trimmed,
//! - the last value wins on duplicate keys,
//! - a line that is not `key: value` aborts parsing,
//! - more than [`MAX_ENV_LINES`] lines abort parsing.

use std::collections::HashMap;

use percent_encoding::percent_decode_str;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    constants::{ENV_PREFIX, MAX_ENV_LINES},
    error::{AgiError, AgiResult},
    variables::AgiVariable,
};

/// Parsed AGI startup block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: HashMap<String, String>,
}

/// Incremental parser fed one line at a time.
#[derive(Debug, Default)]
struct EnvironmentBuilder {
    vars: HashMap<String, String>,
    accepted: usize,
}

impl EnvironmentBuilder {
    /// Feed one line. Returns `true` once the terminating empty line is seen.
    fn push(&mut self, line: &str) -> AgiResult<bool> {
        if line.is_empty() {
            return Ok(true);
        }
        if self.accepted >= MAX_ENV_LINES {
            return Err(AgiError::EnvironmentTooLarge {
                limit: MAX_ENV_LINES,
            });
        }

        let (key, value) = parse_env_line(line)?;
        self.vars
            .insert(key, value);
        self.accepted += 1;
        Ok(false)
    }

    fn build(self) -> Environment {
        Environment { vars: self.vars }
    }
}

fn parse_env_line(line: &str) -> AgiResult<(String, String)> {
    let malformed = || AgiError::MalformedEnvironment {
        line: line.to_string(),
    };

    let (key, value) = line
        .split_once(':')
        .ok_or_else(malformed)?;
    if key.is_empty() || key.contains(char::is_whitespace) {
        return Err(malformed());
    }

    let key = key
        .strip_prefix(ENV_PREFIX)
        .unwrap_or(key);
    let value = value
        .strip_prefix(' ')
        .unwrap_or(value)
        .trim_end();
    Ok((key.to_string(), value.to_string()))
}

/// Split an AGI request (`agi://host:port/path?query`) into path and query.
fn split_request(request: &str) -> (&str, Option<&str>) {
    let (base, query) = match request.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (request, None),
    };

    let path = match base.split_once("://") {
        Some((_, authority_and_path)) => authority_and_path
            .find('/')
            .map(|i| &authority_and_path[i..])
            .unwrap_or("/"),
        None => base,
    };
    (path, query)
}

fn decode_query_component(s: &str) -> String {
    let spaced = s.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8_lossy()
        .into_owned()
}

impl Environment {
    /// Parse a complete block from already-framed lines.
    ///
    /// Lines after the terminating empty line are not consumed. Running out
    /// of lines before the terminator is [`AgiError::ConnectionClosed`].
    pub fn from_lines<I, S>(lines: I) -> AgiResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = EnvironmentBuilder::default();
        for line in lines {
            if builder.push(line.as_ref())? {
                return Ok(builder.build());
            }
        }
        Err(AgiError::ConnectionClosed)
    }

    /// Read the startup block from the session's inbound line channel.
    pub async fn read(inbound: &mut mpsc::Receiver<String>) -> AgiResult<Self> {
        let mut builder = EnvironmentBuilder::default();
        while let Some(line) = inbound
            .recv()
            .await
        {
            match builder.push(&line) {
                Ok(true) => {
                    let env = builder.build();
                    env.log_variables();
                    return Ok(env);
                }
                Ok(false) => {}
                Err(e) => {
                    warn!("[SESSION] No AGI compatible input: {}", e);
                    return Err(e);
                }
            }
        }
        Err(AgiError::ConnectionClosed)
    }

    fn log_variables(&self) {
        debug!("[SESSION] Finished reading {} AGI variables", self.len());
        for var in AgiVariable::ALL {
            if let Some(value) = self.variable(*var) {
                debug!("[SESSION]   {}\t\t{}", var.wire_name(), value);
            }
        }
        for (key, value) in self.custom() {
            debug!("[SESSION]   {}{}\t\t{}", ENV_PREFIX, key, value);
        }
    }

    /// Look up a variable by name, without the `agi_` prefix.
    pub fn get(&self, name: impl AsRef<str>) -> Option<&str> {
        self.vars
            .get(name.as_ref())
            .map(|s| s.as_str())
    }

    /// Typed lookup of a standard variable.
    pub fn variable(&self, var: AgiVariable) -> Option<&str> {
        self.get(var)
    }

    /// Script argument `arg_<n>` (1-based, as Asterisk numbers them).
    pub fn arg(&self, n: usize) -> Option<&str> {
        self.get(format!("arg_{}", n))
    }

    /// The raw `agi_request` value.
    pub fn request(&self) -> Option<&str> {
        self.variable(AgiVariable::Request)
    }

    /// Path component of the request URI, e.g. `/hello` for
    /// `agi://10.0.0.1/hello?file=demo`. Embedded AGI requests (a bare
    /// script name) are returned unchanged.
    pub fn request_path(&self) -> Option<&str> {
        self.request()
            .map(|r| split_request(r).0)
    }

    /// First value of query parameter `name` in the request URI, decoded.
    pub fn request_param(&self, name: &str) -> Option<String> {
        let (_, query) = split_request(self.request()?);
        query?
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
            .find(|(key, _)| decode_query_component(key) == name)
            .map(|(_, value)| decode_query_component(value))
    }

    /// Variables outside the standard [`AgiVariable`] set, such as script
    /// arguments and `agi_` channel variables added by the dialplan.
    pub fn custom(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter()
            .filter(|(key, _)| {
                key.parse::<AgiVariable>()
                    .is_err()
            })
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// `true` if the block carried no variables.
    pub fn is_empty(&self) -> bool {
        self.vars
            .is_empty()
    }

    /// Iterate over `(name, value)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
