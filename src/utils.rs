//! Small shared helpers.

use rust_decimal::{Decimal, RoundingStrategy};
use time::OffsetDateTime;
use tracing::info;

/// Round `value` to the nearest multiple of `increment`, midpoints away from zero.
///
/// The result carries the increment's scale, so a cent increment always
/// yields two decimal places. Values too large to divide by `increment` are
/// returned unchanged. Presentation only; never feed the result back into a
/// calculation.
pub fn round_to_increment(value: Decimal, increment: Decimal) -> Decimal {
    if increment <= Decimal::ZERO {
        return value;
    }

    let rounded = value
        .checked_div(increment)
        .map(|steps| steps.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|steps| steps.checked_mul(increment));

    match rounded {
        Some(mut rounded) => {
            rounded.rescale(increment.normalize().scale());
            rounded
        }
        None => value,
    }
}

/// Milliseconds elapsed from `earlier` to `later` (negative if reversed).
pub fn millis_between(earlier: OffsetDateTime, later: OffsetDateTime) -> i64 {
    let millis = (later - earlier).whole_milliseconds();
    millis.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// Resolve on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
