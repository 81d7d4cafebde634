use std::fmt::Debug;

/// Extension for `Result`s that represent fatal startup failures: things
/// like a bad broker URI or an unreachable database that should stop the
/// process immediately with a readable message rather than panic with a
/// raw `Debug` dump.
pub trait ResultExt<T> {
    fn unwrap_or_exit_process(self, context: &str) -> T;
}

impl<T, E: Debug> ResultExt<T> for Result<T, E> {
    fn unwrap_or_exit_process(self, context: &str) -> T {
        match self {
            Ok(value) => value,
            Err(error) => {
                eprintln!("[FATAL] {context}: {error:?}");
                std::process::exit(1);
            }
        }
    }
}

/// Failures from [`crate::amqp::RabbitMqPublisher`]. Every variant is a
/// transient-dependency failure from the caller's point of view: a
/// publish that returns `Err` here must not be treated as delivered, and
/// the caller's own offset/ack must not advance past it.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("publish channel is not connected")]
    NotConnected,

    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("broker rejected publish: {0}")]
    Broker(#[from] lapin::Error),

    #[error("broker nacked publish")]
    Nacked,
}
