use super::*;
use shared::domain::Slide;
use tokio::sync::mpsc;

use crate::registry::Frame;

fn drain(rx: &mut mpsc::Receiver<Frame>) -> Vec<ServerMessage> {
    let mut messages = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        messages.push(serde_json::from_str(&frame).expect("server message"));
    }
    messages
}

fn pace_states(messages: Vec<ServerMessage>) -> Vec<PresentationState> {
    messages
        .into_iter()
        .filter_map(|message| match message {
            ServerMessage::PaceChange(state) => Some(state),
            _ => None,
        })
        .collect()
}

async fn join(actor: &PresentationActor, role: Role) -> (SessionId, mpsc::Receiver<Frame>) {
    let (handle, rx) = SessionHandle::channel(role, 16);
    let id = handle.id;
    actor.admit(handle).await.expect("admit");
    (id, rx)
}

fn actor() -> PresentationActor {
    PresentationActor::new(PresentationId::new("demo"))
}

#[tokio::test]
async fn voter_admission_is_announced_to_presenters_only() {
    let actor = actor();
    let (_presenter, mut presenter_rx) = join(&actor, Role::Presenter).await;
    let (_voter, mut voter_rx) = join(&actor, Role::Voter).await;

    assert_eq!(actor.voter_count().await, 1);
    let states = pace_states(drain(&mut presenter_rx));
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].voter_count, 1);
    assert!(drain(&mut voter_rx).is_empty());
}

#[tokio::test]
async fn presenter_admission_is_silent() {
    let actor = actor();
    let (_a, mut a_rx) = join(&actor, Role::Presenter).await;
    let (_b, _b_rx) = join(&actor, Role::Presenter).await;
    assert!(drain(&mut a_rx).is_empty());
    assert_eq!(actor.presenter_count().await, 2);
}

#[tokio::test]
async fn voter_removal_decrements_once_and_notifies_presenters() {
    let actor = actor();
    let (_presenter, mut presenter_rx) = join(&actor, Role::Presenter).await;
    let (voter_a, _a_rx) = join(&actor, Role::Voter).await;
    let (_voter_b, mut b_rx) = join(&actor, Role::Voter).await;
    drain(&mut presenter_rx);

    assert!(actor.remove(voter_a).await);
    assert!(!actor.remove(voter_a).await);

    assert_eq!(actor.voter_count().await, 1);
    assert_eq!(actor.snapshot().await.voter_count, 1);
    let states = pace_states(drain(&mut presenter_rx));
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].voter_count, 1);
    assert!(drain(&mut b_rx).is_empty());
}

#[tokio::test]
async fn presenter_removal_keeps_voters() {
    let actor = actor();
    let (presenter, _p_rx) = join(&actor, Role::Presenter).await;
    let (_voter, _v_rx) = join(&actor, Role::Voter).await;

    assert!(actor.remove(presenter).await);
    assert_eq!(actor.voter_count().await, 1);
    assert_eq!(actor.presenter_count().await, 0);
}

#[tokio::test]
async fn ping_and_ready_reply_to_sender_only() {
    let actor = actor();
    let (presenter, mut presenter_rx) = join(&actor, Role::Presenter).await;
    let (voter, mut voter_rx) = join(&actor, Role::Voter).await;
    drain(&mut presenter_rx);

    actor.handle(voter, ClientMessage::Ping).await;
    actor.handle(voter, ClientMessage::ClientReady).await;

    let replies = drain(&mut voter_rx);
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0], ServerMessage::Pong);
    let ServerMessage::InitialState(state) = &replies[1] else {
        panic!("expected INITIAL_STATE, got {:?}", replies[1]);
    };
    assert_eq!(state.voter_count, 1);
    assert!(drain(&mut presenter_rx).is_empty());

    actor.handle(presenter, ClientMessage::Ping).await;
    assert_eq!(drain(&mut presenter_rx), vec![ServerMessage::Pong]);
}

#[tokio::test]
async fn state_changes_reach_everyone() {
    let actor = actor();
    let (presenter, mut presenter_rx) = join(&actor, Role::Presenter).await;
    let (voter, mut voter_rx) = join(&actor, Role::Voter).await;
    drain(&mut presenter_rx);

    actor
        .handle(
            presenter,
            ClientMessage::UpdateSlides(vec![Slide::new("a", "A"), Slide::new("b", "B")]),
        )
        .await;
    actor.handle(presenter, ClientMessage::NextSlide).await;
    actor.handle(voter, ClientMessage::Like).await;
    actor.handle(presenter, ClientMessage::PreviousSlide).await;

    let presenter_states = pace_states(drain(&mut presenter_rx));
    let voter_states = pace_states(drain(&mut voter_rx));
    assert_eq!(presenter_states.len(), 4);
    assert_eq!(presenter_states, voter_states);

    let last = presenter_states.last().expect("last");
    assert_eq!(last.current_slide_index, 0);
    assert_eq!(last.slides[1].like_count, 1);
}

#[tokio::test]
async fn unchanged_navigation_is_not_broadcast() {
    let actor = actor();
    let (presenter, mut presenter_rx) = join(&actor, Role::Presenter).await;

    actor.handle(presenter, ClientMessage::PreviousSlide).await;
    actor.handle(presenter, ClientMessage::NextSlide).await;
    actor.handle(presenter, ClientMessage::Like).await;

    assert!(drain(&mut presenter_rx).is_empty());
}

#[tokio::test]
async fn voter_cannot_replace_slides() {
    let actor = actor();
    let (voter, mut voter_rx) = join(&actor, Role::Voter).await;

    actor
        .handle(voter, ClientMessage::UpdateSlides(vec![Slide::new("x", "X")]))
        .await;

    assert!(actor.snapshot().await.slides.is_empty());
    assert!(drain(&mut voter_rx).is_empty());
}

#[tokio::test]
async fn commands_from_removed_sessions_are_ignored() {
    let actor = actor();
    let (presenter, _rx) = join(&actor, Role::Presenter).await;
    actor.remove(presenter).await;

    let handled = actor
        .handle(presenter, ClientMessage::UpdateSlides(vec![Slide::new("x", "X")]))
        .await;
    assert!(!handled);
    assert!(actor.snapshot().await.slides.is_empty());
}

#[tokio::test]
async fn lagging_session_is_dropped_without_blocking_others() {
    let actor = actor();
    let (presenter, mut presenter_rx) = join(&actor, Role::Presenter).await;
    let (slow, _slow_rx) = SessionHandle::channel(Role::Voter, 1);
    let slow_id = slow.id;
    let detached = slow.detached_signal();
    actor.admit(slow).await.expect("admit");

    actor
        .handle(
            presenter,
            ClientMessage::UpdateSlides(vec![Slide::new("a", "A"), Slide::new("b", "B")]),
        )
        .await;
    actor.handle(presenter, ClientMessage::NextSlide).await;

    assert_eq!(actor.voter_count().await, 0);
    assert!(!actor.remove(slow_id).await);
    tokio::time::timeout(std::time::Duration::from_secs(1), detached.notified())
        .await
        .expect("dropped session is told to close");
    assert!(!actor.handle(slow_id, ClientMessage::Like).await);

    let states = pace_states(drain(&mut presenter_rx));
    let last = states.last().expect("presenter kept receiving");
    assert_eq!(last.current_slide_index, 1);
    assert_eq!(last.voter_count, 0);
}

#[tokio::test]
async fn concurrent_likes_are_not_lost() {
    let actor = std::sync::Arc::new(actor());
    let (presenter_handle, _p_rx) = SessionHandle::channel(Role::Presenter, 1024);
    let presenter = presenter_handle.id;
    actor.admit(presenter_handle).await.expect("admit");
    actor
        .handle(presenter, ClientMessage::UpdateSlides(vec![Slide::new("a", "A")]))
        .await;

    let mut voters = Vec::new();
    for _ in 0..8 {
        let (handle, rx) = SessionHandle::channel(Role::Voter, 1024);
        voters.push((handle.id, rx));
        actor.admit(handle).await.expect("admit");
    }

    let mut tasks = Vec::new();
    for (voter, _) in &voters {
        let actor = std::sync::Arc::clone(&actor);
        let voter = *voter;
        tasks.push(tokio::spawn(async move {
            for _ in 0..25 {
                actor.handle(voter, ClientMessage::Like).await;
            }
        }));
    }
    for task in tasks {
        task.await.expect("task");
    }

    assert_eq!(actor.snapshot().await.slides[0].like_count, 200);
}

#[tokio::test]
async fn retired_actor_refuses_admission() {
    let actor = actor();
    assert!(actor.retire_if_idle(Instant::now(), Duration::ZERO));
    let (handle, _rx) = SessionHandle::channel(Role::Voter, 4);
    assert!(actor.admit(handle).await.is_err());
}

#[tokio::test]
async fn actor_with_sessions_is_never_idle() {
    let actor = actor();
    let (_voter, _rx) = join(&actor, Role::Voter).await;
    assert!(!actor.retire_if_idle(Instant::now() + Duration::from_secs(3600), Duration::ZERO));
}
