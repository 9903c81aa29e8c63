use std::future::poll_fn;
use std::pin::{Pin, pin};
use std::sync::Arc;

use omnichat_model::{
    ModelProvider, ModelProviderError, ModelRequest, ModelResponse,
    ModelResponseEvent,
};
use tracing::Instrument;

/// The outcome of a streamed reply: the full text, or why it failed.
pub type StreamResult = Result<String, Box<dyn ModelProviderError>>;

type BoxedStreamFuture = Pin<Box<dyn Future<Output = StreamResult> + Send>>;
#[rustfmt::skip]
type HandlerFn = Arc<
    dyn Fn(ModelRequest, Box<dyn FnMut(String) + Send + 'static>)
        -> BoxedStreamFuture + Send + Sync
>;

/// A wrapper around a model provider that drives one streamed reply at a
/// time and provides a type-erased interface for the other modules.
#[derive(Clone)]
pub struct ModelClient {
    handler_fn: HandlerFn,
}

impl ModelClient {
    /// Wraps a model provider.
    #[inline]
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        // We have to erase the type `P`, since `ModelClient` doesn't have a
        // generic parameter and we don't want it either.
        let handler_fn: HandlerFn = Arc::new(move |req, on_fragment| {
            let fut = provider.send_request(&req);
            Box::pin(
                async move {
                    trace!("got a request: {:?}", req);
                    let resp_or_err = fut.await;
                    handle_response::<P>(resp_or_err, on_fragment).await
                }
                .instrument(trace_span!("model client req")),
            )
        });
        Self { handler_fn }
    }

    /// Opens one streamed reply and feeds every non-empty fragment to
    /// `on_fragment`, in order, before pulling the next one.
    ///
    /// Returns the concatenated reply once the stream ends cleanly.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. The response stops streaming further
    /// events when this operation is cancelled.
    #[inline]
    pub async fn stream_reply(
        &self,
        req: ModelRequest,
        on_fragment: impl FnMut(String) + Send + 'static,
    ) -> StreamResult {
        (self.handler_fn)(req, Box::new(on_fragment)).await
    }
}

async fn handle_response<P: ModelProvider + 'static>(
    resp_or_err: Result<P::Response, P::Error>,
    mut on_fragment: Box<dyn FnMut(String) + Send + 'static>,
) -> StreamResult {
    let resp = match resp_or_err {
        Ok(resp) => resp,
        Err(err) => {
            error!("failed to open the stream: {err}");
            return Err(Box::new(err));
        }
    };

    let mut reply = String::new();

    trace!("start receiving events");

    let mut pinned_resp = pin!(resp);
    loop {
        let event_or_err =
            poll_fn(|cx| pinned_resp.as_mut().poll_next_event(cx)).await;
        let event = match event_or_err {
            Ok(event) => event,
            Err(err) => {
                error!("stream ended abnormally: {err}");
                return Err(Box::new(err));
            }
        };

        let Some(event) = event else {
            break;
        };
        trace!("got an event: {event:?}");

        match event {
            ModelResponseEvent::MessageDelta(fragment) => {
                if fragment.is_empty() {
                    continue;
                }
                reply.push_str(&fragment);
                on_fragment(fragment);
            }
            ModelResponseEvent::Completed(reason) => {
                debug!("model finished: {reason:?}");
            }
        }
    }

    trace!("finished a request");

    Ok(reply)
}
