pub mod connection;
pub mod dispatcher;
pub mod notifier;

pub use dispatcher::Dispatcher;
pub use notifier::{HttpNotifier, Notifier, NotifyError, notify_best_effort, publish_message};
