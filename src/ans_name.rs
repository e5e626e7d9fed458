//! Structured agent names.
//!
//! An ANS name is `<protocol>://<agent_id>.<capability>.<provider>.v<version>`
//! with an optional `,<extension>` suffix, e.g.
//! `a2a://chat.conversation.openai.v1.2.3`. Parsing is strict: every component
//! is validated and the canonical string form round-trips exactly.

use std::fmt;
use std::str::FromStr;

use crate::error::AnsError;
use crate::version::Version;

/// Checks the `[A-Za-z0-9_-]+` token rule shared by agent ids, capabilities,
/// providers, and extensions.
pub fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn is_protocol_token(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

/// A fully-specified agent name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnsName {
    pub protocol: String,
    pub agent_id: String,
    pub capability: String,
    pub provider: String,
    pub version: Version,
    pub extension: Option<String>,
}

impl AnsName {
    /// Parse a canonical ANS name string.
    pub fn parse(input: &str) -> Result<Self, AnsError> {
        let (protocol, rest) = split_scheme(input)?;
        if protocol == "*" {
            return Err(AnsError::InvalidName(format!(
                "wildcard protocol is not a valid name: '{input}'"
            )));
        }

        // The extension, if any, starts at the first comma.
        let (body, extension) = match rest.split_once(',') {
            Some((body, ext)) => {
                if ext.is_empty() || ext.chars().any(|c| c.is_whitespace()) {
                    return Err(AnsError::InvalidName(format!(
                        "invalid extension in '{input}'"
                    )));
                }
                (body, Some(ext.to_string()))
            }
            None => (rest, None),
        };

        // `id.cap.provider.vMAJOR.MINOR.PATCH` splits into exactly six
        // fragments because the version itself contains two dots.
        let fragments: Vec<&str> = body.split('.').collect();
        if fragments.len() != 6 {
            return Err(AnsError::InvalidName(format!(
                "expected '<id>.<capability>.<provider>.v<semver>' after scheme in '{input}'"
            )));
        }

        let agent_id = parse_component(fragments[0], "agent id", input)?;
        let capability = parse_component(fragments[1], "capability", input)?;
        let provider = parse_component(fragments[2], "provider", input)?;

        let version_str = fragments[3]
            .strip_prefix('v')
            .ok_or_else(|| {
                AnsError::InvalidName(format!("version segment must start with 'v' in '{input}'"))
            })
            .map(|major| format!("{major}.{}.{}", fragments[4], fragments[5]))?;
        let version = Version::parse(&version_str)
            .map_err(|e| AnsError::InvalidName(format!("bad version in '{input}': {e}")))?;

        Ok(AnsName {
            protocol,
            agent_id,
            capability,
            provider,
            version,
            extension,
        })
    }

    /// True when this name matches the given filter fields. `None` or the
    /// literal `*` matches anything.
    pub fn matches(
        &self,
        protocol: Option<&str>,
        capability: Option<&str>,
        provider: Option<&str>,
    ) -> bool {
        field_matches(&self.protocol, protocol)
            && field_matches(&self.capability, capability)
            && field_matches(&self.provider, provider)
    }
}

fn field_matches(value: &str, filter: Option<&str>) -> bool {
    match filter {
        None | Some("*") => true,
        Some(f) => value == f,
    }
}

fn split_scheme<'a>(input: &'a str) -> Result<(String, &'a str), AnsError> {
    let mut parts = input.splitn(2, "://");
    let scheme = parts.next().unwrap_or("");
    let rest = parts
        .next()
        .ok_or_else(|| AnsError::InvalidName(format!("missing '://' in '{input}'")))?;
    if rest.contains("://") {
        return Err(AnsError::InvalidName(format!(
            "more than one '://' in '{input}'"
        )));
    }
    if !is_protocol_token(scheme) && scheme != "*" {
        return Err(AnsError::InvalidName(format!(
            "protocol must be lowercase alphanumeric, got '{scheme}'"
        )));
    }
    Ok((scheme.to_string(), rest))
}

fn parse_component(value: &str, what: &str, input: &str) -> Result<String, AnsError> {
    if !is_token(value) {
        return Err(AnsError::InvalidName(format!(
            "invalid {what} '{value}' in '{input}'"
        )));
    }
    Ok(value.to_string())
}

impl fmt::Display for AnsName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}.{}.{}.v{}",
            self.protocol, self.agent_id, self.capability, self.provider, self.version
        )?;
        if let Some(ext) = &self.extension {
            write!(f, ",{ext}")?;
        }
        Ok(())
    }
}

impl FromStr for AnsName {
    type Err = AnsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnsName::parse(s)
    }
}

/// A resolution pattern: a name whose trailing fields may be omitted or
/// given as `*`. `a2a://chat` matches every capability/provider/version of
/// the `chat` agent under the `a2a` protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnsNamePattern {
    pub protocol: Option<String>,
    pub agent_id: Option<String>,
    pub capability: Option<String>,
    pub provider: Option<String>,
    pub version: Option<Version>,
}

impl AnsNamePattern {
    pub fn parse(input: &str) -> Result<Self, AnsError> {
        let (protocol, rest) = split_scheme(input)?;
        let protocol = wildcard(protocol);

        // Extensions are not part of candidate matching.
        let body = rest.split_once(',').map(|(b, _)| b).unwrap_or(rest);
        let fragments: Vec<&str> = body.split('.').collect();

        match fragments.len() {
            1..=3 => {
                let mut fields = fragments.iter();
                Ok(AnsNamePattern {
                    protocol,
                    agent_id: pattern_component(fields.next(), "agent id", input)?,
                    capability: pattern_component(fields.next(), "capability", input)?,
                    provider: pattern_component(fields.next(), "provider", input)?,
                    version: None,
                })
            }
            // `id.cap.provider.v*` leaves the version open.
            4 if fragments[3] == "v*" || fragments[3] == "*" => Ok(AnsNamePattern {
                protocol,
                agent_id: pattern_component(Some(&fragments[0]), "agent id", input)?,
                capability: pattern_component(Some(&fragments[1]), "capability", input)?,
                provider: pattern_component(Some(&fragments[2]), "provider", input)?,
                version: None,
            }),
            6 => {
                let version_str = fragments[3]
                    .strip_prefix('v')
                    .ok_or_else(|| {
                        AnsError::InvalidName(format!(
                            "version segment must start with 'v' in '{input}'"
                        ))
                    })
                    .map(|major| format!("{major}.{}.{}", fragments[4], fragments[5]))?;
                let version = Version::parse(&version_str)
                    .map_err(|e| AnsError::InvalidName(format!("bad version in '{input}': {e}")))?;
                Ok(AnsNamePattern {
                    protocol,
                    agent_id: pattern_component(Some(&fragments[0]), "agent id", input)?,
                    capability: pattern_component(Some(&fragments[1]), "capability", input)?,
                    provider: pattern_component(Some(&fragments[2]), "provider", input)?,
                    version: Some(version),
                })
            }
            _ => Err(AnsError::InvalidName(format!(
                "unrecognized name or pattern '{input}'"
            ))),
        }
    }

    /// True when the fixed fields of the pattern match the given name.
    /// Version constraints are negotiated separately.
    pub fn matches_components(&self, name: &AnsName) -> bool {
        opt_eq(&self.protocol, &name.protocol)
            && opt_eq(&self.agent_id, &name.agent_id)
            && opt_eq(&self.capability, &name.capability)
            && opt_eq(&self.provider, &name.provider)
    }
}

fn wildcard(s: String) -> Option<String> {
    if s == "*" {
        None
    } else {
        Some(s)
    }
}

fn pattern_component(
    value: Option<&&str>,
    what: &str,
    input: &str,
) -> Result<Option<String>, AnsError> {
    match value {
        None => Ok(None),
        Some(&"*") => Ok(None),
        Some(&v) => {
            if !is_token(v) {
                return Err(AnsError::InvalidName(format!(
                    "invalid {what} '{v}' in '{input}'"
                )));
            }
            Ok(Some(v.to_string()))
        }
    }
}

fn opt_eq(filter: &Option<String>, value: &str) -> bool {
    match filter {
        None => true,
        Some(f) => f == value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips() {
        for s in [
            "a2a://chat.conversation.openai.v1.2.3",
            "mcp://ctx_agent.document-context.anthropic.v0.9.17",
            "a2a://chat.conversation.openai.v1.2.3,beta-1",
        ] {
            let name = AnsName::parse(s).unwrap();
            assert_eq!(name.to_string(), s);
            assert_eq!(AnsName::parse(&name.to_string()).unwrap(), name);
        }
    }

    #[test]
    fn parse_extracts_components() {
        let name = AnsName::parse("a2a://chat.conversation.openai.v1.2.3,ext").unwrap();
        assert_eq!(name.protocol, "a2a");
        assert_eq!(name.agent_id, "chat");
        assert_eq!(name.capability, "conversation");
        assert_eq!(name.provider, "openai");
        assert_eq!(name.version, Version::new(1, 2, 3));
        assert_eq!(name.extension.as_deref(), Some("ext"));
    }

    #[test]
    fn rejects_malformed_names() {
        for s in [
            "",
            "chat.conversation.openai.v1.2.3",
            "a2a://chat.conversation.v1.2.3",
            "a2a://chat.conversation.openai.1.2.3",
            "a2a://chat.conversation.openai.v1.2",
            "a2a://chat.conversation.openai.v1.2.x",
            "A2A://chat.conversation.openai.v1.2.3",
            "a2a://ch at.conversation.openai.v1.2.3",
            "a2a://chat.conversation.openai.v1.2.3,",
            "a2a://chat.conversation.openai.v1.2.3,with space",
            "a2a://a2a://chat.conversation.openai.v1.2.3",
        ] {
            assert!(AnsName::parse(s).is_err(), "accepted: {s}");
        }
    }

    #[test]
    fn filter_matching_with_wildcards() {
        let name = AnsName::parse("a2a://chat.conversation.openai.v1.2.3").unwrap();
        assert!(name.matches(Some("a2a"), None, None));
        assert!(name.matches(Some("*"), Some("conversation"), Some("openai")));
        assert!(!name.matches(Some("mcp"), None, None));
        assert!(!name.matches(None, Some("translation"), None));
    }

    #[test]
    fn pattern_with_omitted_fields() {
        let p = AnsNamePattern::parse("a2a://chat").unwrap();
        assert_eq!(p.agent_id.as_deref(), Some("chat"));
        assert!(p.capability.is_none());
        assert!(p.version.is_none());

        let name = AnsName::parse("a2a://chat.conversation.openai.v1.2.3").unwrap();
        assert!(p.matches_components(&name));

        let other = AnsName::parse("a2a://translate.conversation.openai.v1.2.3").unwrap();
        assert!(!p.matches_components(&other));
    }

    #[test]
    fn pattern_with_explicit_wildcards() {
        let p = AnsNamePattern::parse("a2a://chat.*.openai.v*").unwrap();
        assert!(p.capability.is_none());
        assert_eq!(p.provider.as_deref(), Some("openai"));
        assert!(p.version.is_none());
    }

    #[test]
    fn full_name_is_an_exact_pattern() {
        let p = AnsNamePattern::parse("a2a://chat.conversation.openai.v1.2.3").unwrap();
        assert_eq!(p.version, Some(Version::new(1, 2, 3)));
        let name = AnsName::parse("a2a://chat.conversation.openai.v1.2.3").unwrap();
        assert!(p.matches_components(&name));
    }
}
