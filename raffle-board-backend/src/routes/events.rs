//! Server-sent events for one raffle.

use core::convert::Infallible;

use bytes::Bytes;
use futures_util::stream;
use headers::{CacheControl, ContentType, HeaderMapExt as _};
use http::Response;
use http_body::Frame;
use http_body_util::{BodyExt as _, StreamBody};
use raffle_board_lifecycle::{ChangeKind, RaffleChange, RaffleId};
use tokio::select;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use crate::error::AppError;
use crate::{AppState, ResponseBody};

const fn event_name(kind: &ChangeKind) -> &'static str {
    match kind {
        ChangeKind::Created => "created",
        ChangeKind::SlotUpdated { .. } => "slot_updated",
        ChangeKind::RaffleUpdated => "raffle_updated",
        ChangeKind::Finalized { .. } => "finalized",
    }
}

fn encode_event(change: &RaffleChange) -> Result<Bytes, serde_json::Error> {
    let data = serde_json::to_string(change)?;
    Ok(Bytes::from(format!(
        "event: {}\ndata: {data}\n\n",
        event_name(&change.kind)
    )))
}

/// Streams every committed change of `raffle_id` until the feed closes or
/// the server shuts down.
pub async fn stream(
    state: &AppState,
    raffle_id: RaffleId,
) -> Result<Response<ResponseBody>, AppError> {
    // subscribe before the existence check so no change in between is lost
    let receiver = state.engine.subscribe();
    state.engine.get_raffle(&raffle_id).await?;

    let events = stream::unfold(
        (receiver, raffle_id, state.shutdown.clone()),
        |(mut receiver, raffle_id, shutdown)| async move {
            loop {
                let received = select! {
                    () = shutdown.cancelled() => return None,
                    received = receiver.recv() => received,
                };
                match received {
                    Ok(change) if change.raffle_id == raffle_id => match encode_event(&change) {
                        Ok(event) => {
                            return Some((
                                Ok::<_, Infallible>(Frame::data(event)),
                                (receiver, raffle_id, shutdown),
                            ));
                        }
                        Err(err) => warn!("failed to encode change event: {err}"),
                    },
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("event stream for {raffle_id} fell behind, skipped {skipped} changes");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        },
    );

    let mut response = Response::new(StreamBody::new(events).boxed_unsync());
    let headers = response.headers_mut();
    headers.typed_insert(ContentType::from(mime::TEXT_EVENT_STREAM));
    headers.typed_insert(CacheControl::new().with_no_cache());
    Ok(response)
}
