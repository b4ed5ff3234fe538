//! Inbound signaling: decode a frame, drive the session's engine, reply on the
//! same channel. Nothing in here ends a session.

use tracing::{debug, info, warn};

use crate::engine::SdpKind;
use crate::error::{NegotiationError, ProtocolError};
use crate::session::Session;
use crate::signaling::{decode_candidate, decode_client_message, ClientMessage, ServerMessage};

/// What became of one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// A reply frame was queued on the session's channel.
    Replied,
    /// The message was processed and needs no reply, or its negotiation step failed.
    NoReply,
    /// The frame could not be decoded and was discarded.
    Dropped,
}

pub async fn handle_frame(session: &Session, text: &str) -> HandleOutcome {
    match decode_client_message(text) {
        Ok(message) => handle_message(session, message).await,
        Err(ProtocolError::UnknownType(kind)) => {
            debug!(channel_id = %session.channel_id(), kind = %kind, "ignoring unknown message type");
            HandleOutcome::Dropped
        }
        Err(err) => {
            warn!(channel_id = %session.channel_id(), error = %err, "dropping inbound frame");
            HandleOutcome::Dropped
        }
    }
}

pub async fn handle_message(session: &Session, message: ClientMessage) -> HandleOutcome {
    let channel_id = session.channel_id();
    match message {
        ClientMessage::Join { name } => {
            session.set_name(name);
            let shown = session.name().unwrap_or_else(|| "<anonymous>".to_string());
            info!(channel_id = %channel_id, name = %shown, "peer joined");
            match session.engine().create_offer().await {
                Ok(sdp) => reply(session, ServerMessage::Offer { sdp }),
                Err(err) => negotiation_failed(session, "create offer", err),
            }
        }

        ClientMessage::Offer { sdp } => {
            debug!(channel_id = %channel_id, "received offer");
            let engine = session.engine();
            if let Err(err) = engine.set_remote_description(SdpKind::Offer, sdp).await {
                return negotiation_failed(session, "set remote offer", err);
            }
            match engine.create_answer().await {
                Ok(sdp) => reply(session, ServerMessage::Answer { sdp }),
                Err(err) => negotiation_failed(session, "create answer", err),
            }
        }

        ClientMessage::Answer { sdp } => {
            debug!(channel_id = %channel_id, "received answer");
            if let Err(err) = session
                .engine()
                .set_remote_description(SdpKind::Answer, sdp)
                .await
            {
                return negotiation_failed(session, "set remote answer", err);
            }
            HandleOutcome::NoReply
        }

        ClientMessage::Candidate { candidate } => {
            debug!(channel_id = %channel_id, "received candidate");
            let candidate = match decode_candidate(candidate) {
                Ok(candidate) => candidate,
                Err(err) => {
                    warn!(channel_id = %channel_id, error = %err, "dropping remote candidate");
                    return HandleOutcome::Dropped;
                }
            };
            if let Err(err) = session.engine().add_ice_candidate(candidate).await {
                return negotiation_failed(session, "add ice candidate", err);
            }
            HandleOutcome::NoReply
        }
    }
}

fn reply(session: &Session, message: ServerMessage) -> HandleOutcome {
    let kind = message.kind();
    match session.outbound().send(message) {
        Ok(()) => {
            debug!(channel_id = %session.channel_id(), kind, "queued reply");
            HandleOutcome::Replied
        }
        Err(err) => {
            // The read side will observe the disconnect and tear the session down.
            debug!(channel_id = %session.channel_id(), kind, error = %err, "reply not sent");
            HandleOutcome::NoReply
        }
    }
}

fn negotiation_failed(session: &Session, step: &'static str, err: NegotiationError) -> HandleOutcome {
    warn!(channel_id = %session.channel_id(), step, error = %err, "negotiation step failed");
    HandleOutcome::NoReply
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    use crate::channel::OutboundChannel;
    use crate::engine::memory::MemoryEngineState;
    use crate::engine::{MemoryEngine, MemoryEngineOptions};
    use crate::session::ChannelId;

    struct Harness {
        session: Session,
        state: Arc<Mutex<MemoryEngineState>>,
        replies: mpsc::UnboundedReceiver<ServerMessage>,
    }

    fn harness(options: MemoryEngineOptions) -> Harness {
        let channel_id = ChannelId::new();
        let (engine, parts) = MemoryEngine::new(channel_id, options);
        let (outbound, replies) = OutboundChannel::new(channel_id);
        Harness {
            session: Session::new(channel_id, None, Box::new(engine), outbound),
            state: parts.state,
            replies,
        }
    }

    fn drain(replies: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(message) = replies.try_recv() {
            out.push(message);
        }
        out
    }

    #[test_timeout::tokio_timeout_test]
    async fn join_replies_with_exactly_one_offer() {
        let mut h = harness(MemoryEngineOptions::default());

        let outcome = handle_frame(&h.session, r#"{"type":"join","name":"alice"}"#).await;
        assert_eq!(outcome, HandleOutcome::Replied);
        assert_eq!(h.session.name().as_deref(), Some("alice"));

        let replies = drain(&mut h.replies);
        assert_eq!(replies.len(), 1);
        let ServerMessage::Offer { sdp } = &replies[0] else {
            panic!("expected offer, got {:?}", replies[0]);
        };
        assert!(sdp.starts_with("v=0"));
    }

    #[test_timeout::tokio_timeout_test]
    async fn anonymous_join_still_gets_an_offer() {
        let mut h = harness(MemoryEngineOptions::default());

        let outcome = handle_frame(&h.session, r#"{"type":"join","name":"   "}"#).await;
        assert_eq!(outcome, HandleOutcome::Replied);
        assert_eq!(h.session.name(), None);
        assert_eq!(h.state.lock().offers_created, 1);
        assert_eq!(drain(&mut h.replies).len(), 1);
    }

    #[test_timeout::tokio_timeout_test]
    async fn join_sends_nothing_when_engine_fails() {
        let mut h = harness(MemoryEngineOptions {
            reject_negotiation: true,
            ..Default::default()
        });

        let outcome = handle_frame(&h.session, r#"{"type":"join","name":"bob"}"#).await;
        assert_eq!(outcome, HandleOutcome::NoReply);
        assert!(drain(&mut h.replies).is_empty());
    }

    #[test_timeout::tokio_timeout_test]
    async fn offer_replies_with_one_answer() {
        let mut h = harness(MemoryEngineOptions::default());

        let outcome = handle_frame(&h.session, r#"{"type":"offer","sdp":"v=0\r\nX"}"#).await;
        assert_eq!(outcome, HandleOutcome::Replied);

        let replies = drain(&mut h.replies);
        assert_eq!(replies.len(), 1);
        assert!(matches!(replies[0], ServerMessage::Answer { .. }));
        assert!(matches!(
            h.state.lock().remote,
            Some((SdpKind::Offer, _))
        ));
    }

    #[test_timeout::tokio_timeout_test]
    async fn rejected_offer_sends_nothing_and_session_stays_usable() {
        let mut h = harness(MemoryEngineOptions::default());

        let outcome = handle_frame(&h.session, r#"{"type":"offer","sdp":"garbage"}"#).await;
        assert_eq!(outcome, HandleOutcome::NoReply);
        assert!(drain(&mut h.replies).is_empty());

        let outcome = handle_frame(&h.session, r#"{"type":"offer","sdp":"v=0\r\n"}"#).await;
        assert_eq!(outcome, HandleOutcome::Replied);
        assert_eq!(drain(&mut h.replies).len(), 1);
    }

    #[test_timeout::tokio_timeout_test]
    async fn answer_never_replies() {
        let mut h = harness(MemoryEngineOptions::default());
        handle_frame(&h.session, r#"{"type":"join"}"#).await;
        drain(&mut h.replies);

        let outcome = handle_frame(&h.session, r#"{"type":"answer","sdp":"v=0\r\n"}"#).await;
        assert_eq!(outcome, HandleOutcome::NoReply);
        assert!(drain(&mut h.replies).is_empty());
        assert!(matches!(
            h.state.lock().remote,
            Some((SdpKind::Answer, _))
        ));
    }

    #[test_timeout::tokio_timeout_test]
    async fn answer_failure_is_only_logged() {
        let mut h = harness(MemoryEngineOptions::default());

        // No local offer exists yet, so the engine refuses the answer.
        let outcome = handle_frame(&h.session, r#"{"type":"answer","sdp":"v=0\r\n"}"#).await;
        assert_eq!(outcome, HandleOutcome::NoReply);
        assert!(drain(&mut h.replies).is_empty());
        assert!(h.state.lock().remote.is_none());
    }

    #[test_timeout::tokio_timeout_test]
    async fn candidate_grows_engine_list_without_reply() {
        let mut h = harness(MemoryEngineOptions::default());

        let outcome = handle_frame(
            &h.session,
            r#"{"type":"candidate","candidate":{"candidate":"candidate:1 1 udp 2122260223 192.0.2.1 54321 typ host","sdpMid":"0","sdpMLineIndex":0}}"#,
        )
        .await;
        assert_eq!(outcome, HandleOutcome::NoReply);
        assert!(drain(&mut h.replies).is_empty());
        assert_eq!(h.state.lock().candidates.len(), 1);
    }

    #[test_timeout::tokio_timeout_test]
    async fn malformed_candidate_is_dropped() {
        let mut h = harness(MemoryEngineOptions::default());

        let outcome = handle_frame(
            &h.session,
            r#"{"type":"candidate","candidate":{"sdpMLineIndex":"zero"}}"#,
        )
        .await;
        assert_eq!(outcome, HandleOutcome::Dropped);
        assert!(drain(&mut h.replies).is_empty());
        assert!(h.state.lock().candidates.is_empty());
    }

    #[test_timeout::tokio_timeout_test]
    async fn malformed_frame_does_not_block_next_message() {
        let mut h = harness(MemoryEngineOptions::default());

        assert_eq!(
            handle_frame(&h.session, "{\"type\":\"join\",").await,
            HandleOutcome::Dropped
        );
        assert_eq!(
            handle_frame(&h.session, r#"{"type":"wave"}"#).await,
            HandleOutcome::Dropped
        );
        assert_eq!(
            handle_frame(&h.session, r#"{"type":"join","name":"carol"}"#).await,
            HandleOutcome::Replied
        );

        let replies = drain(&mut h.replies);
        assert_eq!(replies.len(), 1);
        assert!(matches!(replies[0], ServerMessage::Offer { .. }));
    }

    #[test_timeout::tokio_timeout_test]
    async fn reply_after_writer_exit_is_not_an_error() {
        let h = harness(MemoryEngineOptions::default());
        drop(h.replies);

        let outcome = handle_frame(&h.session, r#"{"type":"join"}"#).await;
        assert_eq!(outcome, HandleOutcome::NoReply);
    }
}
