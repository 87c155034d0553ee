use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Install the standard structured logging subscriber.
///
/// Hosts embedding the pipeline may install their own subscriber instead;
/// this helper is what the bundled tooling and tests use.
pub fn init(max_level: Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(max_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok(); // Ignored if a subscriber is already set
}
