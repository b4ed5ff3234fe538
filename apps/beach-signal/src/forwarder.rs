use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::channel::OutboundChannel;
use crate::engine::CandidateEvent;
use crate::signaling::ServerMessage;

/// Forward locally gathered candidates to the browser as they appear.
///
/// Runs beside the session's receive loop and shares only the outbound channel
/// with it. Exits when the engine drops its event sender (closed connection) or
/// when the channel's writer is gone; teardown also aborts it.
pub fn spawn_candidate_forwarder(
    mut events: mpsc::UnboundedReceiver<CandidateEvent>,
    outbound: OutboundChannel,
) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let channel_id = outbound.channel_id();
        let mut forwarded = 0usize;
        while let Some(event) = events.recv().await {
            let candidate = match event {
                CandidateEvent::Discovered(candidate) => candidate,
                CandidateEvent::GatheringComplete => {
                    debug!(channel_id = %channel_id, forwarded, "candidate gathering complete");
                    continue;
                }
            };
            if outbound
                .send(ServerMessage::Candidate { candidate })
                .is_err()
            {
                debug!(channel_id = %channel_id, "channel closed; stopping candidate forwarder");
                break;
            }
            forwarded += 1;
        }
        forwarded
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ChannelId;
    use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;

    fn discovered(line: &str) -> CandidateEvent {
        CandidateEvent::Discovered(RTCIceCandidateInit {
            candidate: line.to_string(),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        })
    }

    #[test_timeout::tokio_timeout_test]
    async fn forwards_candidates_and_filters_sentinel() {
        let channel_id = ChannelId::new();
        let (outbound, mut frames) = OutboundChannel::new(channel_id);
        let (tx, rx) = mpsc::unbounded_channel();
        let forwarder = spawn_candidate_forwarder(rx, outbound);

        tx.send(discovered("candidate:1")).unwrap();
        tx.send(discovered("candidate:2")).unwrap();
        tx.send(CandidateEvent::GatheringComplete).unwrap();
        drop(tx);

        assert_eq!(forwarder.await.unwrap(), 2);

        let mut lines = Vec::new();
        while let Ok(message) = frames.try_recv() {
            match message {
                ServerMessage::Candidate { candidate } => lines.push(candidate.candidate),
                other => panic!("unexpected frame {other:?}"),
            }
        }
        assert_eq!(lines, vec!["candidate:1", "candidate:2"]);
    }

    #[test_timeout::tokio_timeout_test]
    async fn stops_when_channel_closes() {
        let channel_id = ChannelId::new();
        let (outbound, frames) = OutboundChannel::new(channel_id);
        drop(frames);
        let (tx, rx) = mpsc::unbounded_channel();
        let forwarder = spawn_candidate_forwarder(rx, outbound);

        tx.send(discovered("candidate:1")).unwrap();
        assert_eq!(forwarder.await.unwrap(), 0);
        assert!(tx.send(discovered("candidate:2")).is_err());
    }
}
