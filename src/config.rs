//! Hook configuration: one optional command template per notification channel.
//!
//! A template is a shell command line containing exactly one `%s` placeholder.
//! Wallet templates may additionally use `%w`, `%b` and `%h`; `%%` is a literal
//! percent sign everywhere.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use thiserror::Error;

use crate::notify::engine::types::Channel;

/// Errors detected while parsing a command template.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// The template is empty or whitespace only.
    #[error("{0} template is empty")]
    Empty(Channel),

    /// No `%s` placeholder.
    #[error("{0} template '{1}' has no %s placeholder")]
    MissingPlaceholder(Channel, String),

    /// More than one `%s` placeholder.
    #[error("{0} template '{1}' has more than one %s placeholder")]
    DuplicatePlaceholder(Channel, String),

    /// A `%` token the channel does not support.
    #[error("{channel} template '{template}' uses unsupported token %{token}")]
    UnknownToken {
        channel: Channel,
        template: String,
        token: char,
    },
}

/// One piece of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Token(char),
}

/// A validated command line with substitution tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl CommandTemplate {
    /// Parses and validates `raw` for use on `channel`.
    pub fn parse(channel: Channel, raw: &str) -> Result<Self, TemplateError> {
        if raw.trim().is_empty() {
            return Err(TemplateError::Empty(channel));
        }

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut placeholders = 0usize;
        let mut chars = raw.chars();

        while let Some(c) = chars.next() {
            if c != '%' {
                literal.push(c);
                continue;
            }
            match chars.next() {
                Some('%') => literal.push('%'),
                Some(token) if channel.supports_token(token) => {
                    if token == 's' {
                        placeholders += 1;
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Token(token));
                }
                Some(token) => {
                    return Err(TemplateError::UnknownToken {
                        channel,
                        template: raw.to_string(),
                        token,
                    })
                }
                // A trailing '%' has nothing to substitute; keep it verbatim.
                None => literal.push('%'),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        match placeholders {
            0 => Err(TemplateError::MissingPlaceholder(channel, raw.to_string())),
            1 => Ok(Self {
                raw: raw.to_string(),
                segments,
            }),
            _ => Err(TemplateError::DuplicatePlaceholder(channel, raw.to_string())),
        }
    }

    /// The template as configured.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Renders the command line. `lookup` supplies the value for each token;
    /// substituted values are never re-scanned for tokens.
    pub fn render<F>(&self, mut lookup: F) -> String
    where
        F: FnMut(char) -> String,
    {
        let mut out = String::with_capacity(self.raw.len() + 64);
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Token(t) => out.push_str(&lookup(*t)),
            }
        }
        out
    }

    /// Renders with only the `%s` subject.
    pub fn render_subject(&self, subject: &str) -> String {
        self.render(|_| subject.to_string())
    }
}

/// Hook settings for the three notification channels.
///
/// A channel without a template is disabled: its events are dropped by the
/// dispatcher.
#[derive(Debug, Clone, Default)]
pub struct HookConfig {
    pub block_notify: Option<CommandTemplate>,
    pub wallet_notify: Option<CommandTemplate>,
    pub alert_notify: Option<CommandTemplate>,

    /// Substituted (shell-escaped) for `%w` in wallet templates.
    pub wallet_name: String,

    /// Upper bound on commands running at once. `None` = unbounded.
    pub max_concurrent: Option<usize>,

    /// Kill a command still running after this long.
    pub command_timeout: Option<Duration>,
}

impl HookConfig {
    pub fn with_block_notify(mut self, template: &str) -> Result<Self, TemplateError> {
        self.block_notify = Some(CommandTemplate::parse(Channel::Block, template)?);
        Ok(self)
    }

    pub fn with_wallet_notify(mut self, template: &str) -> Result<Self, TemplateError> {
        self.wallet_notify = Some(CommandTemplate::parse(Channel::Wallet, template)?);
        Ok(self)
    }

    pub fn with_alert_notify(mut self, template: &str) -> Result<Self, TemplateError> {
        self.alert_notify = Some(CommandTemplate::parse(Channel::Alert, template)?);
        Ok(self)
    }

    pub fn with_wallet_name(mut self, name: impl Into<String>) -> Self {
        self.wallet_name = name.into();
        self
    }

    /// Template configured for `channel`, if any.
    pub fn template(&self, channel: Channel) -> Option<&CommandTemplate> {
        match channel {
            Channel::Block => self.block_notify.as_ref(),
            Channel::Wallet => self.wallet_notify.as_ref(),
            Channel::Alert => self.alert_notify.as_ref(),
        }
    }

    /// Loads settings from a JSON file. Templates are validated on load.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading hook config {}", path.display()))?;
        let raw: RawHookConfig = serde_json::from_str(&text)
            .with_context(|| format!("parsing hook config {}", path.display()))?;
        raw.try_into()
            .with_context(|| format!("invalid hook config {}", path.display()))
    }
}

/// On-disk shape of [`HookConfig`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawHookConfig {
    pub blocknotify: Option<String>,
    pub walletnotify: Option<String>,
    pub alertnotify: Option<String>,
    pub walletname: Option<String>,
    pub max_concurrent: Option<usize>,
    pub command_timeout_secs: Option<u64>,
}

impl TryFrom<RawHookConfig> for HookConfig {
    type Error = TemplateError;

    fn try_from(raw: RawHookConfig) -> Result<Self, Self::Error> {
        let parse = |channel, t: Option<String>| {
            t.map(|t| CommandTemplate::parse(channel, &t)).transpose()
        };
        Ok(HookConfig {
            block_notify: parse(Channel::Block, raw.blocknotify)?,
            wallet_notify: parse(Channel::Wallet, raw.walletnotify)?,
            alert_notify: parse(Channel::Alert, raw.alertnotify)?,
            wallet_name: raw.walletname.unwrap_or_default(),
            max_concurrent: raw.max_concurrent,
            command_timeout: raw.command_timeout_secs.map(Duration::from_secs),
        })
    }
}

/// Quotes `s` for a POSIX shell.
pub fn shell_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\"'\"'"))
}

/// Characters an alert message may keep.
const SAFE_ALERT_CHARS: &str = " .,;-_/:?@()";

/// Strips everything outside the safe set and single-quotes the result.
pub fn sanitize_alert(message: &str) -> String {
    let safe: String = message
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || SAFE_ALERT_CHARS.contains(*c))
        .collect();
    format!("'{safe}'")
}
