use crate::config::{shell_escape, HookConfig};
use crate::notify::dispatch::CommandSink;
use crate::notify::engine::types::{Channel, NotificationEvent};

/// Routes each event to the command configured for its channel.
pub struct Dispatcher<S> {
    config: HookConfig,
    sink: S,
}

impl<S: CommandSink> Dispatcher<S> {
    pub fn new(config: HookConfig, sink: S) -> Self {
        Self { config, sink }
    }

    /// Whether events on `channel` lead anywhere.
    pub fn is_enabled(&self, channel: Channel) -> bool {
        self.config.template(channel).is_some()
    }

    /// Renders and submits the command for `event`. A channel without a
    /// template is a no-op.
    pub fn dispatch(&self, event: &NotificationEvent) {
        let Some(template) = self.config.template(event.channel) else {
            log::trace!("[DISPATCH] {} disabled, dropping {}", event.channel, event.subject);
            return;
        };

        let command = match event.channel {
            Channel::Wallet => {
                let confirmed_at = event.confirmed_at();
                template.render(|token| match token {
                    'w' => shell_escape(&self.config.wallet_name),
                    'b' => confirmed_at
                        .map(|c| c.hash.to_string())
                        .unwrap_or_else(|| "unconfirmed".to_string()),
                    'h' => confirmed_at
                        .map(|c| c.height.to_string())
                        .unwrap_or_else(|| "-1".to_string()),
                    _ => event.subject.clone(),
                })
            }
            Channel::Block | Channel::Alert => template.render_subject(&event.subject),
        };

        log::debug!(
            "[DISPATCH] {} {:?} {} -> {}",
            event.channel,
            event.transition,
            event.subject,
            command
        );
        self.sink.submit(command);
    }
}
