//! A local fake model for testing purpose.

mod preset;

use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use omnichat_model::{
    ErrorKind, ModelFinishReason, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, ModelResponseEvent,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: &'static str,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Stage {
    Streaming(usize),
    Completing,
    Done,
}

pub struct TestModelResponse {
    preset: PresetResponse,
    stage: Stage,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl TestModelResponse {
    fn next_event(&mut self) -> Result<Option<ModelResponseEvent>, Error> {
        match self.stage {
            Stage::Streaming(idx) if idx < self.preset.events.len() => {
                self.stage = Stage::Streaming(idx + 1);
                let PresetEvent::MessageDelta(msg) = &self.preset.events[idx];
                Ok(Some(ModelResponseEvent::MessageDelta(msg.clone())))
            }
            Stage::Streaming(_) => {
                self.stage = Stage::Completing;
                if self.preset.failure == Some(PresetFailure::Stream) {
                    self.stage = Stage::Done;
                    return Err(Error {
                        message: "stream broke off",
                        kind: ErrorKind::Network,
                    });
                }
                Ok(Some(ModelResponseEvent::Completed(ModelFinishReason::Stop)))
            }
            // In case this method is called after completion.
            Stage::Completing | Stage::Done => {
                self.stage = Stage::Done;
                Ok(None)
            }
        }
    }
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();
        if this.stage == Stage::Done {
            return Poll::Ready(Ok(None));
        }

        let delay = this.delay;
        let sleep = this.sleep.get_or_insert_with(|| Box::pin(sleep(delay)));
        ready!(sleep.as_mut().poll(cx));
        this.sleep = None;
        Poll::Ready(this.next_event())
    }
}

#[derive(Default)]
struct Script {
    responses: Vec<PresetResponse>,
    requests: Vec<ModelRequest>,
}

/// A local fake model for testing purpose.
///
/// Before sending requests, you need to setup the script, which is how the
/// model should respond to each request: the n-th request gets the n-th
/// preset response. If there are no enough responses in the script, an error
/// will be returned.
///
/// Clones share the script and the request log, so a test can keep a clone
/// to inspect what the code under test has sent.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    script: Arc<Mutex<Script>>,
    delay: Option<Duration>,
}

impl TestModelProvider {
    /// Appends a response to the script.
    #[inline]
    pub fn add_response(&mut self, preset: PresetResponse) {
        self.lock().responses.push(preset);
    }

    /// Sets the pause before every event.
    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns the requests received so far.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.lock().requests.clone()
    }

    /// Returns the number of requests received so far.
    pub fn request_count(&self) -> usize {
        self.lock().requests.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|err| err.into_inner())
    }
}

impl Debug for TestModelProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestModelProvider")
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Response = TestModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let mut script = self.lock();
        script.requests.push(req.clone());
        let step_idx = script.requests.len() - 1;

        let result = match script.responses.get(step_idx) {
            None => Err(Error {
                message: "no enough steps",
                kind: ErrorKind::Other,
            }),
            Some(preset) => match preset.failure {
                Some(PresetFailure::Open) => Err(Error {
                    message: "failed to open the stream",
                    kind: ErrorKind::Network,
                }),
                Some(PresetFailure::Configuration) => Err(Error {
                    message: "missing credential",
                    kind: ErrorKind::Configuration,
                }),
                _ => Ok(TestModelResponse {
                    preset: preset.clone(),
                    stage: Stage::Streaming(0),
                    delay: self.delay.unwrap_or(Duration::from_millis(1)),
                    sleep: None,
                }),
            },
        };
        ready(result)
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use omnichat_model::ModelMessage;

    use super::*;

    async fn collect_response(
        resp: TestModelResponse,
    ) -> (String, Result<(), Error>) {
        let mut resp = pin!(resp);
        let mut msg = String::new();
        loop {
            match poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await {
                Ok(Some(ModelResponseEvent::MessageDelta(delta))) => {
                    msg.push_str(&delta);
                }
                Ok(Some(ModelResponseEvent::Completed(_))) => {}
                Ok(None) => return (msg, Ok(())),
                Err(err) => return (msg, Err(err)),
            }
        }
    }

    fn user_request(text: &str) -> ModelRequest {
        ModelRequest {
            messages: vec![ModelMessage::User(text.to_owned())],
        }
    }

    #[tokio::test]
    async fn test_send_request() {
        let mut provider = TestModelProvider::default();
        provider.add_response(PresetResponse::with_fragments(["Hello, ", "world!"]));
        provider.add_response(PresetResponse::with_fragments([
            "Sure, ",
            "let me take a ",
            "look.",
        ]));

        let resp = provider.send_request(&user_request("Hi")).await.unwrap();
        let (msg, result) = collect_response(resp).await;
        assert_eq!(msg, "Hello, world!");
        assert!(result.is_ok());

        let resp = provider
            .send_request(&user_request("Check my todo"))
            .await
            .unwrap();
        let (msg, result) = collect_response(resp).await;
        assert_eq!(msg, "Sure, let me take a look.");
        assert!(result.is_ok());

        let prompts: Vec<_> = provider
            .requests()
            .iter()
            .filter_map(|req| req.prompt().map(str::to_owned))
            .collect();
        assert_eq!(prompts, ["Hi", "Check my todo"]);
    }

    #[tokio::test]
    async fn test_failures() {
        let mut provider = TestModelProvider::default();
        provider.add_response(
            PresetResponse::with_fragments(["Par", "tial"])
                .with_failure(PresetFailure::Stream),
        );
        provider.add_response(
            PresetResponse::with_fragments(["never"])
                .with_failure(PresetFailure::Open),
        );
        provider.add_response(
            PresetResponse::with_fragments(["never"])
                .with_failure(PresetFailure::Configuration),
        );

        let resp = provider.send_request(&user_request("a")).await.unwrap();
        let (msg, result) = collect_response(resp).await;
        assert_eq!(msg, "Partial");
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Network);

        let Err(err) = provider.send_request(&user_request("b")).await else {
            panic!("expected the call to fail");
        };
        assert_eq!(err.kind(), ErrorKind::Network);

        let Err(err) = provider.send_request(&user_request("c")).await else {
            panic!("expected the call to fail");
        };
        assert_eq!(err.kind(), ErrorKind::Configuration);

        // The script is exhausted.
        let Err(err) = provider.send_request(&user_request("d")).await else {
            panic!("expected the call to fail");
        };
        assert_eq!(err.kind(), ErrorKind::Other);
        assert_eq!(provider.request_count(), 4);
    }

    #[tokio::test]
    async fn test_clones_share_script() {
        let mut provider = TestModelProvider::default();
        let observer = provider.clone();
        provider.add_response(PresetResponse::with_fragments(["ok"]));

        let resp = provider.send_request(&user_request("Hi")).await.unwrap();
        let (msg, _) = collect_response(resp).await;
        assert_eq!(msg, "ok");
        assert_eq!(observer.request_count(), 1);
    }
}
