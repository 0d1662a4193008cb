//! 流式工具调用：发起后立即拿到句柄，按固定间隔轮询直到完成
//!
//! 轮询结果建模为有界、惰性的 Stream<PollOutcome>（futures_util::stream::unfold），
//! 所有等待都经过注入的 Clock，因此预算与退避在测试中不需要真实计时器。

use std::time::Duration;

use futures_util::stream::{self, Stream, StreamExt};
use serde_json::Value;

use crate::config::StreamSection;
use crate::core::{InvocationCause, ReelError, ToolInvocationError, TransportError};
use crate::tools::{StreamPoll, StreamStart, ToolCallResult, ToolInvoker};

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub poll_interval: Duration,
    /// 轮询预算：超过仍未完成则 StreamTimeout
    pub max_polls: u32,
    /// 通道瞬时错误后在下一次轮询前额外等待
    pub error_backoff: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_polls: 30,
            error_backoff: Duration::from_secs(2),
        }
    }
}

impl From<&StreamSection> for StreamConfig {
    fn from(section: &StreamSection) -> Self {
        Self {
            poll_interval: Duration::from_millis(section.poll_interval_ms),
            max_polls: section.max_polls,
            error_backoff: Duration::from_millis(section.error_backoff_ms),
        }
    }
}

/// 单次轮询的结果
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Progress(Value),
    /// 通道瞬时错误，继续轮询
    TransientError(TransportError),
    Complete(ToolCallResult),
}

struct PollState {
    polls: u32,
    backoff: bool,
    done: bool,
}

pub struct StreamPoller {
    invoker: ToolInvoker,
    config: StreamConfig,
}

impl StreamPoller {
    pub fn new(invoker: ToolInvoker, config: StreamConfig) -> Self {
        Self { invoker, config }
    }

    pub fn invoker(&self) -> &ToolInvoker {
        &self.invoker
    }

    /// 某个流的轮询结果序列：最多 max_polls 项，Complete 之后或会话关闭后结束
    pub fn poll_outcomes<'a>(&'a self, stream_id: &'a str) -> impl Stream<Item = PollOutcome> + Send + 'a {
        let initial = PollState {
            polls: 0,
            backoff: false,
            done: false,
        };

        stream::unfold(initial, move |mut state| async move {
            if state.done || state.polls >= self.config.max_polls {
                return None;
            }
            let session = self.invoker.session();

            let mut wait = self.config.poll_interval;
            if state.backoff {
                wait += self.config.error_backoff;
            }
            session.clock().sleep(wait).await;
            if session.is_closed() {
                return None;
            }

            state.polls += 1;
            let outcome = match session
                .transport()
                .get_stream_result(session.project_id(), stream_id)
                .await
            {
                Ok(StreamPoll::Pending { progress }) => {
                    session.touch().await;
                    state.backoff = false;
                    PollOutcome::Progress(progress)
                }
                Ok(StreamPoll::Complete(result)) => {
                    session.touch().await;
                    state.done = true;
                    PollOutcome::Complete(result)
                }
                Err(e) => {
                    tracing::debug!(stream_id, poll = state.polls, error = %e, "Transient poll error");
                    state.backoff = true;
                    PollOutcome::TransientError(e)
                }
            };
            Some((outcome, state))
        })
    }

    /// callToolStream：每个进行中的轮询结果恰好调用一次 on_progress
    pub async fn call_tool_stream<F>(
        &self,
        name: &str,
        parameters: Value,
        mut on_progress: F,
    ) -> Result<ToolCallResult, ReelError>
    where
        F: FnMut(&Value) + Send,
    {
        let handle = match self.invoker.start_stream(name, parameters).await? {
            StreamStart::Immediate(result) => return finish(name, result),
            StreamStart::Handle(handle) => handle,
        };
        tracing::debug!(tool = name, stream_id = %handle.stream_id, "Stream started");

        let outcomes = self.poll_outcomes(&handle.stream_id);
        futures_util::pin_mut!(outcomes);

        let mut polls = 0u32;
        while let Some(outcome) = outcomes.next().await {
            polls += 1;
            match outcome {
                PollOutcome::Progress(progress) => on_progress(&progress),
                PollOutcome::TransientError(_) => {}
                PollOutcome::Complete(result) => {
                    tracing::debug!(tool = name, polls, "Stream complete");
                    return finish(name, result);
                }
            }
        }

        if self.invoker.session().is_closed() {
            return Err(ToolInvocationError::new(name, InvocationCause::SessionClosed).into());
        }
        tracing::warn!(tool = name, stream_id = %handle.stream_id, polls, "Stream poll budget exhausted");
        Err(ReelError::StreamTimeout {
            tool: name.to_string(),
            stream_id: handle.stream_id.clone(),
            polls,
        })
    }
}

fn finish(tool: &str, result: ToolCallResult) -> Result<ToolCallResult, ReelError> {
    match result {
        ToolCallResult::Failure(message) => {
            Err(ToolInvocationError::new(tool, InvocationCause::ToolReported(message)).into())
        }
        success => Ok(success),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;

    use crate::clock::ManualClock;
    use crate::session::{Session, SessionConfig};
    use crate::tools::{InvokerConfig, StreamHandle};
    use crate::transport::{Operation, ScriptedTransport};

    const TOOL: &str = "generate_scene_video";

    fn setup() -> (Arc<ScriptedTransport>, Arc<ManualClock>, StreamPoller) {
        let transport = Arc::new(ScriptedTransport::new());
        let clock = Arc::new(ManualClock::new());
        let session = Session::new(
            "p1",
            transport.clone(),
            clock.clone(),
            SessionConfig {
                heartbeat_enabled: false,
                ..SessionConfig::default()
            },
        );
        let invoker = ToolInvoker::new(session, InvokerConfig::default());
        (transport, clock, StreamPoller::new(invoker, StreamConfig::default()))
    }

    fn start(transport: &ScriptedTransport, stream_id: &str) {
        transport.push_stream_start(TOOL, Ok(StreamStart::Handle(StreamHandle::new(stream_id))));
    }

    #[tokio::test]
    async fn test_progress_then_complete() {
        let (transport, clock, poller) = setup();
        start(&transport, "st-1");
        for pct in [10, 40, 80] {
            transport.push_poll("st-1", Ok(StreamPoll::Pending { progress: json!({"percent": pct}) }));
        }
        transport.push_poll(
            "st-1",
            Ok(StreamPoll::Complete(ToolCallResult::Success(json!({"videoUrl": "v.mp4"})))),
        );

        let mut seen = Vec::new();
        let result = poller
            .call_tool_stream(TOOL, json!({"sceneId": "s1"}), |p| seen.push(p["percent"].clone()))
            .await
            .unwrap();

        assert_eq!(result.data().unwrap()["videoUrl"], "v.mp4");
        assert_eq!(seen, vec![json!(10), json!(40), json!(80)]);
        assert_eq!(transport.count(Operation::GetStreamResult), 4);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(1); 4]);
    }

    #[tokio::test]
    async fn test_transient_error_adds_backoff() {
        let (transport, clock, poller) = setup();
        start(&transport, "st-2");
        transport
            .push_poll("st-2", Err(TransportError::Timeout))
            .push_poll("st-2", Ok(StreamPoll::Pending { progress: Value::Null }))
            .push_poll("st-2", Ok(StreamPoll::Complete(ToolCallResult::Success(json!({})))));

        let mut ticks = 0;
        poller
            .call_tool_stream(TOOL, json!({}), |_| ticks += 1)
            .await
            .unwrap();

        assert_eq!(ticks, 1);
        let secs: Vec<u64> = clock.sleeps().iter().map(Duration::as_secs).collect();
        assert_eq!(secs, vec![1, 3, 1]);
    }

    #[tokio::test]
    async fn test_tool_reported_failure_stops_polling() {
        let (transport, _clock, poller) = setup();
        start(&transport, "st-3");
        transport
            .push_poll("st-3", Ok(StreamPoll::Complete(ToolCallResult::Failure("nsfw".to_string()))))
            .push_poll("st-3", Ok(StreamPoll::Pending { progress: Value::Null }));

        let err = poller.call_tool_stream(TOOL, json!({}), |_| {}).await.unwrap_err();
        match err {
            ReelError::ToolInvocation(e) => {
                assert_eq!(e.tool, TOOL);
                assert_eq!(e.cause, InvocationCause::ToolReported("nsfw".to_string()));
            }
            other => panic!("Expected ToolInvocation, got {other:?}"),
        }
        assert_eq!(transport.count(Operation::GetStreamResult), 1);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_is_stream_timeout() {
        let (transport, _clock, poller) = setup();
        start(&transport, "st-4");
        for _ in 0..40 {
            transport.push_poll("st-4", Ok(StreamPoll::Pending { progress: Value::Null }));
        }

        let mut ticks = 0;
        let err = poller
            .call_tool_stream(TOOL, json!({}), |_| ticks += 1)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReelError::StreamTimeout { ref tool, ref stream_id, polls: 30 } if tool == TOOL && stream_id == "st-4"
        ));
        assert_eq!(ticks, 30);
        assert_eq!(transport.count(Operation::GetStreamResult), 30);
    }

    #[tokio::test]
    async fn test_immediate_result_skips_polling() {
        let (transport, clock, poller) = setup();
        let result = poller
            .call_tool_stream(TOOL, json!({"projectId": "p1", "sceneId": "s1"}), |_| {})
            .await
            .unwrap();
        assert!(result.data().unwrap()["videoUrl"].is_string());
        assert_eq!(transport.count(Operation::GetStreamResult), 0);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_poll_outcomes_is_bounded() {
        let (transport, _clock, poller) = setup();
        for _ in 0..40 {
            transport.push_poll("st-5", Err(TransportError::Timeout));
        }
        let outcomes: Vec<PollOutcome> = poller.poll_outcomes("st-5").collect().await;
        assert_eq!(outcomes.len(), 30);
        assert!(outcomes
            .iter()
            .all(|o| matches!(o, PollOutcome::TransientError(TransportError::Timeout))));
    }
}
