//! Rendering and reporting of failed fits.
//!
//! Reporting is a read-only consumer of the [`Node`] tree: a [`Formatter`]
//! turns a tree into text, a [`Reporter`] decides where that text goes.
use tracing::Level;

use crate::node::Node;

mod json5;

pub use json5::Json5Formatter;

pub trait Formatter: Send + Sync {
    fn format(&self, node: &Node<'_>) -> String;
}

pub trait Reporter: Send + Sync {
    fn report(&self, node: &Node<'_>);
}

/// Emits the formatted tree as a `tracing` event.
pub struct LogReporter {
    formatter: Box<dyn Formatter>,
    level: Level,
}

impl LogReporter {
    pub fn new(formatter: impl Formatter + 'static) -> Self {
        Self {
            formatter: Box::new(formatter),
            level: Level::ERROR,
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }
}

impl Default for LogReporter {
    fn default() -> Self {
        Self::new(Json5Formatter::default())
    }
}

impl Reporter for LogReporter {
    fn report(&self, node: &Node<'_>) {
        let rendered = self.formatter.format(node);
        // `tracing` needs the level at compile time.
        if self.level == Level::ERROR {
            tracing::error!("value does not fit:\n{rendered}");
        } else if self.level == Level::WARN {
            tracing::warn!("value does not fit:\n{rendered}");
        } else if self.level == Level::INFO {
            tracing::info!("value does not fit:\n{rendered}");
        } else if self.level == Level::DEBUG {
            tracing::debug!("value does not fit:\n{rendered}");
        } else {
            tracing::trace!("value does not fit:\n{rendered}");
        }
    }
}

/// Renders `node` with the uncoloured default formatter.
pub fn render(node: &Node<'_>) -> String {
    Json5Formatter::plain().format(node)
}
