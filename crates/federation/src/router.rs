//! Dispatch table from (verb, object kind) to a processing route.

use crate::document::{IncomingActivity, ObjectKind, Verb};
use crate::store::ReactionKind;

/// Side effect an inbound activity resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    CreateContent,
    UpdateContent,
    UpdateActor,
    DeleteContent,
    DeleteActor,
    AnnounceContent,
    React(ReactionKind),
    FollowActor,
    FollowContent,
    AcceptFollow,
    RejectFollow,
    UndoFollow,
    UndoAccept,
    UndoReaction,
    BlockAccount,
    UnblockAccount,
    MoveAccount,
    ReportAccount,
    /// Pin a post to its author's featured collection.
    FeatureContent,
    UnfeatureContent,
    AddTag,
    /// Dropped quietly.
    Ignore,
    /// Logged and dropped.
    Unhandled,
}

impl Route {
    /// Resolve the route of a parsed activity.
    #[must_use]
    pub fn of(activity: &IncomingActivity, process_view: bool) -> Self {
        let targets_actor = activity.object_id.as_deref() == Some(activity.actor.as_str());
        Self::resolve(&activity.verb, &activity.object_kind, targets_actor, process_view)
    }

    /// Every verb is matched explicitly; unsupported object kinds fall into
    /// [`Route::Unhandled`].
    #[must_use]
    pub fn resolve(
        verb: &Verb,
        kind: &ObjectKind,
        targets_actor: bool,
        process_view: bool,
    ) -> Self {
        use ObjectKind as K;

        match verb {
            Verb::Create => match kind {
                K::Content(_) | K::Reference => Self::CreateContent,
                K::Tombstone | K::Empty => Self::Ignore,
                _ => Self::Unhandled,
            },
            Verb::Invite => match kind {
                K::Content(event) if event == "Event" => Self::CreateContent,
                _ => Self::Unhandled,
            },
            Verb::Update => match kind {
                K::Content(_) => Self::UpdateContent,
                K::Actor(_) => Self::UpdateActor,
                K::Reference if targets_actor => Self::UpdateActor,
                K::Tombstone | K::Empty => Self::Ignore,
                _ => Self::Unhandled,
            },
            Verb::Delete => match kind {
                K::Actor(_) => Self::DeleteActor,
                K::Reference if targets_actor => Self::DeleteActor,
                K::Content(_) | K::Tombstone | K::Empty | K::Reference => Self::DeleteContent,
                _ => Self::Unhandled,
            },
            Verb::Announce => match kind {
                K::Content(_) | K::Reference => Self::AnnounceContent,
                K::Tombstone | K::Empty => Self::Ignore,
                _ => Self::Unhandled,
            },
            Verb::Like => Self::reaction(kind, ReactionKind::Like),
            Verb::Dislike => Self::reaction(kind, ReactionKind::Dislike),
            Verb::EmojiReact => Self::reaction(kind, ReactionKind::EmojiReact),
            Verb::Read => Self::reaction(kind, ReactionKind::Read),
            Verb::TentativeAccept => match kind {
                K::Content(_) => Self::React(ReactionKind::AttendMaybe),
                _ => Self::Unhandled,
            },
            Verb::View => match kind {
                K::Content(_) | K::Reference if process_view => Self::React(ReactionKind::View),
                _ => Self::Ignore,
            },
            Verb::Follow => match kind {
                K::Actor(_) | K::Reference => Self::FollowActor,
                K::Content(_) => Self::FollowContent,
                _ => Self::Unhandled,
            },
            Verb::Accept => match kind {
                K::Activity(Verb::Follow) | K::Reference => Self::AcceptFollow,
                K::Content(_) => Self::React(ReactionKind::Attend),
                _ => Self::Unhandled,
            },
            Verb::Reject => match kind {
                K::Activity(Verb::Follow) | K::Reference => Self::RejectFollow,
                K::Content(_) => Self::React(ReactionKind::AttendNo),
                _ => Self::Unhandled,
            },
            Verb::Undo => match kind {
                K::Activity(Verb::Follow) => Self::UndoFollow,
                K::Activity(Verb::Accept) => Self::UndoAccept,
                K::Activity(Verb::Block) => Self::UnblockAccount,
                K::Activity(
                    Verb::Like
                    | Verb::Dislike
                    | Verb::Announce
                    | Verb::EmojiReact
                    | Verb::Read
                    | Verb::View
                    | Verb::Reject
                    | Verb::TentativeAccept,
                )
                | K::Reference => Self::UndoReaction,
                _ => Self::Unhandled,
            },
            Verb::Block => match kind {
                K::Actor(_) | K::Reference => Self::BlockAccount,
                _ => Self::Unhandled,
            },
            Verb::Move => match kind {
                K::Actor(_) | K::Reference if targets_actor => Self::MoveAccount,
                _ => Self::Unhandled,
            },
            Verb::Flag => match kind {
                K::Actor(_) | K::Reference => Self::ReportAccount,
                _ => Self::Unhandled,
            },
            Verb::Add => match kind {
                K::Content(_) | K::Reference => Self::FeatureContent,
                K::Unknown(tag) if tag == "Hashtag" => Self::AddTag,
                K::Tombstone | K::Empty => Self::Ignore,
                _ => Self::Unhandled,
            },
            Verb::Remove => match kind {
                K::Content(_) | K::Reference => Self::UnfeatureContent,
                K::Tombstone | K::Empty => Self::Ignore,
                _ => Self::Unhandled,
            },
            Verb::Other(_) => Self::Unhandled,
        }
    }

    fn reaction(kind: &ObjectKind, reaction: ReactionKind) -> Self {
        match kind {
            ObjectKind::Content(_) | ObjectKind::Reference => Self::React(reaction),
            ObjectKind::Tombstone | ObjectKind::Empty => Self::Ignore,
            _ => Self::Unhandled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note() -> ObjectKind {
        ObjectKind::Content("Note".to_string())
    }

    #[test]
    fn test_content_routes() {
        assert_eq!(Route::resolve(&Verb::Create, &note(), false, false), Route::CreateContent);
        assert_eq!(Route::resolve(&Verb::Update, &note(), false, false), Route::UpdateContent);
        assert_eq!(
            Route::resolve(&Verb::Announce, &ObjectKind::Reference, false, false),
            Route::AnnounceContent
        );
        assert_eq!(
            Route::resolve(&Verb::Create, &ObjectKind::Tombstone, false, false),
            Route::Ignore
        );
    }

    #[test]
    fn test_delete_distinguishes_actor() {
        assert_eq!(
            Route::resolve(&Verb::Delete, &ObjectKind::Reference, true, false),
            Route::DeleteActor
        );
        assert_eq!(
            Route::resolve(&Verb::Delete, &ObjectKind::Reference, false, false),
            Route::DeleteContent
        );
        assert_eq!(
            Route::resolve(&Verb::Delete, &ObjectKind::Tombstone, false, false),
            Route::DeleteContent
        );
    }

    #[test]
    fn test_follow_family() {
        let follow = ObjectKind::Activity(Verb::Follow);
        assert_eq!(Route::resolve(&Verb::Follow, &note(), false, false), Route::FollowContent);
        assert_eq!(
            Route::resolve(&Verb::Follow, &ObjectKind::Reference, false, false),
            Route::FollowActor
        );
        assert_eq!(Route::resolve(&Verb::Accept, &follow, false, false), Route::AcceptFollow);
        assert_eq!(
            Route::resolve(&Verb::Accept, &ObjectKind::Reference, false, false),
            Route::AcceptFollow
        );
        assert_eq!(Route::resolve(&Verb::Reject, &follow, false, false), Route::RejectFollow);
        assert_eq!(Route::resolve(&Verb::Undo, &follow, false, false), Route::UndoFollow);
        assert_eq!(
            Route::resolve(&Verb::Undo, &ObjectKind::Activity(Verb::Accept), false, false),
            Route::UndoAccept
        );
        assert_eq!(
            Route::resolve(&Verb::Undo, &ObjectKind::Activity(Verb::Like), false, false),
            Route::UndoReaction
        );
    }

    #[test]
    fn test_view_respects_setting() {
        assert_eq!(Route::resolve(&Verb::View, &note(), false, false), Route::Ignore);
        assert_eq!(
            Route::resolve(&Verb::View, &note(), false, true),
            Route::React(ReactionKind::View)
        );
    }

    #[test]
    fn test_event_attendance() {
        let event = ObjectKind::Content("Event".to_string());
        assert_eq!(Route::resolve(&Verb::Invite, &event, false, false), Route::CreateContent);
        assert_eq!(Route::resolve(&Verb::Invite, &note(), false, false), Route::Unhandled);
        assert_eq!(
            Route::resolve(&Verb::Accept, &event, false, false),
            Route::React(ReactionKind::Attend)
        );
        assert_eq!(
            Route::resolve(&Verb::Reject, &event, false, false),
            Route::React(ReactionKind::AttendNo)
        );
        assert_eq!(
            Route::resolve(&Verb::TentativeAccept, &event, false, false),
            Route::React(ReactionKind::AttendMaybe)
        );
        assert_eq!(
            Route::resolve(&Verb::Undo, &ObjectKind::Activity(Verb::TentativeAccept), false, false),
            Route::UndoReaction
        );
    }

    #[test]
    fn test_reaction_family() {
        assert_eq!(
            Route::resolve(&Verb::EmojiReact, &ObjectKind::Reference, false, false),
            Route::React(ReactionKind::EmojiReact)
        );
        assert_eq!(
            Route::resolve(&Verb::Read, &note(), false, false),
            Route::React(ReactionKind::Read)
        );
        assert_eq!(
            Route::resolve(&Verb::Like, &ObjectKind::Tombstone, false, false),
            Route::Ignore
        );
        assert_eq!(
            Route::resolve(&Verb::Undo, &ObjectKind::Activity(Verb::EmojiReact), false, false),
            Route::UndoReaction
        );
    }

    #[test]
    fn test_account_routes() {
        let person = ObjectKind::Actor("Person".to_string());
        assert_eq!(Route::resolve(&Verb::Block, &person, false, false), Route::BlockAccount);
        assert_eq!(
            Route::resolve(&Verb::Undo, &ObjectKind::Activity(Verb::Block), false, false),
            Route::UnblockAccount
        );
        assert_eq!(
            Route::resolve(&Verb::Move, &ObjectKind::Reference, true, false),
            Route::MoveAccount
        );
        assert_eq!(
            Route::resolve(&Verb::Move, &ObjectKind::Reference, false, false),
            Route::Unhandled
        );
        assert_eq!(
            Route::resolve(&Verb::Flag, &ObjectKind::Reference, false, false),
            Route::ReportAccount
        );
        assert_eq!(Route::resolve(&Verb::Flag, &note(), false, false), Route::Unhandled);
    }

    #[test]
    fn test_collection_routes() {
        assert_eq!(Route::resolve(&Verb::Add, &note(), false, false), Route::FeatureContent);
        assert_eq!(
            Route::resolve(&Verb::Add, &ObjectKind::Unknown("Hashtag".to_string()), false, false),
            Route::AddTag
        );
        assert_eq!(
            Route::resolve(&Verb::Remove, &ObjectKind::Reference, false, false),
            Route::UnfeatureContent
        );
        assert_eq!(Route::resolve(&Verb::Remove, &ObjectKind::Empty, false, false), Route::Ignore);
    }

    #[test]
    fn test_unknown_combinations_are_unhandled() {
        assert_eq!(
            Route::resolve(&Verb::Other("Arrive".to_string()), &note(), false, false),
            Route::Unhandled
        );
        assert_eq!(
            Route::resolve(&Verb::Like, &ObjectKind::Actor("Person".to_string()), false, false),
            Route::Unhandled
        );
    }
}
