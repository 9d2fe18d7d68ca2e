//! Access decision for gated content.
//!
//! The decision itself is a pure function over snapshots of the viewer's
//! records and the content row; the route assembles those snapshots from the
//! record store and acts on the outcome. Anything that does not match an
//! explicit grant rule is locked.

use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Full,
    Locked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Platform,
    SubscribersOnly,
    Paid,
    Private,
}

impl Visibility {
    /// Unknown strings map to `None`; the caller treats that as locked.
    pub fn parse(value: &str) -> Option<Visibility> {
        match value {
            "public" => Some(Visibility::Public),
            "platform" => Some(Visibility::Platform),
            "subscribers_only" => Some(Visibility::SubscribersOnly),
            "paid" => Some(Visibility::Paid),
            "private" => Some(Visibility::Private),
            _ => None,
        }
    }
}

/// Everything about the viewer the decision depends on. Assembled from the
/// record store before the call; the predicate itself does no I/O.
#[derive(Debug, Clone)]
pub struct Viewer {
    pub user_id: Uuid,
    pub is_admin: bool,
    /// Platform subscription marked active on the user row.
    pub platform_subscription_active: bool,
    pub platform_subscription_expires_at: Option<DateTime<Utc>>,
    /// Professors the viewer holds an active subscription to.
    pub subscribed_professors: Vec<Uuid>,
    /// Active purchase of this specific item.
    pub purchased_item: bool,
    /// Active purchase of the program the item belongs to, if any.
    pub purchased_program: bool,
}

#[derive(Debug, Clone)]
pub struct Content {
    pub author_id: Uuid,
    pub visibility: Option<Visibility>,
    pub program_id: Option<Uuid>,
}

fn platform_subscription_valid(viewer: &Viewer, now: DateTime<Utc>) -> bool {
    viewer.platform_subscription_active
        && viewer
            .platform_subscription_expires_at
            .map(|expires| expires > now)
            .unwrap_or(false)
}

/// Decides whether `viewer` may see `content`. Total: every input yields
/// exactly one of Full/Locked, and the default is Locked.
pub fn decide(viewer: &Viewer, content: &Content, now: DateTime<Utc>) -> Access {
    // Owners and admins see everything
    if viewer.user_id == content.author_id || viewer.is_admin {
        return Access::Full;
    }

    match content.visibility {
        Some(Visibility::Public) => Access::Full,
        Some(Visibility::Platform) => {
            if platform_subscription_valid(viewer, now) {
                Access::Full
            } else {
                Access::Locked
            }
        }
        Some(Visibility::SubscribersOnly) => {
            if viewer.subscribed_professors.contains(&content.author_id) {
                Access::Full
            } else {
                Access::Locked
            }
        }
        Some(Visibility::Paid) => {
            let via_program = content.program_id.is_some()
                && (viewer.purchased_program
                    || viewer.subscribed_professors.contains(&content.author_id));
            if viewer.purchased_item || via_program {
                Access::Full
            } else {
                Access::Locked
            }
        }
        Some(Visibility::Private) | None => Access::Locked,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn viewer() -> Viewer {
        Viewer {
            user_id: Uuid::new_v4(),
            is_admin: false,
            platform_subscription_active: false,
            platform_subscription_expires_at: None,
            subscribed_professors: Vec::new(),
            purchased_item: false,
            purchased_program: false,
        }
    }

    fn content(visibility: Visibility) -> Content {
        Content {
            author_id: Uuid::new_v4(),
            visibility: Some(visibility),
            program_id: None,
        }
    }

    #[test]
    fn owner_sees_everything() {
        let viewer = viewer();
        for visibility in [
            Visibility::Public,
            Visibility::Platform,
            Visibility::SubscribersOnly,
            Visibility::Paid,
            Visibility::Private,
        ] {
            let mut content = content(visibility);
            content.author_id = viewer.user_id;
            assert_eq!(decide(&viewer, &content, Utc::now()), Access::Full);
        }
    }

    #[test]
    fn admin_sees_everything() {
        let mut viewer = viewer();
        viewer.is_admin = true;
        for visibility in [Visibility::Paid, Visibility::Private] {
            assert_eq!(
                decide(&viewer, &content(visibility), Utc::now()),
                Access::Full
            );
        }
    }

    #[test]
    fn public_content_is_open_to_authenticated_viewers() {
        assert_eq!(
            decide(&viewer(), &content(Visibility::Public), Utc::now()),
            Access::Full
        );
    }

    #[test]
    fn platform_tier_needs_an_unexpired_subscription() {
        let now = Utc::now();
        let mut viewer = viewer();
        viewer.platform_subscription_active = true;

        viewer.platform_subscription_expires_at = Some(now + Duration::days(1));
        assert_eq!(
            decide(&viewer, &content(Visibility::Platform), now),
            Access::Full
        );

        viewer.platform_subscription_expires_at = Some(now - Duration::days(1));
        assert_eq!(
            decide(&viewer, &content(Visibility::Platform), now),
            Access::Locked
        );
    }

    #[test]
    fn active_flag_without_expiry_is_not_enough() {
        let mut viewer = viewer();
        viewer.platform_subscription_active = true;
        assert_eq!(
            decide(&viewer, &content(Visibility::Platform), Utc::now()),
            Access::Locked
        );
    }

    #[test]
    fn subscribers_only_needs_a_subscription_to_the_author() {
        let mut viewer = viewer();
        let content = content(Visibility::SubscribersOnly);
        assert_eq!(decide(&viewer, &content, Utc::now()), Access::Locked);

        viewer.subscribed_professors.push(content.author_id);
        assert_eq!(decide(&viewer, &content, Utc::now()), Access::Full);
    }

    #[test]
    fn paid_item_is_open_to_its_buyer() {
        let mut viewer = viewer();
        let content = content(Visibility::Paid);
        assert_eq!(decide(&viewer, &content, Utc::now()), Access::Locked);

        viewer.purchased_item = true;
        assert_eq!(decide(&viewer, &content, Utc::now()), Access::Full);
    }

    #[test]
    fn program_purchase_unlocks_contained_paid_item() {
        let mut viewer = viewer();
        viewer.purchased_program = true;

        // A standalone item is not covered by a program purchase
        let standalone = content(Visibility::Paid);
        assert_eq!(decide(&viewer, &standalone, Utc::now()), Access::Locked);

        let mut in_program = content(Visibility::Paid);
        in_program.program_id = Some(Uuid::new_v4());
        assert_eq!(decide(&viewer, &in_program, Utc::now()), Access::Full);
    }

    #[test]
    fn author_subscription_unlocks_paid_item_in_program() {
        let mut viewer = viewer();
        let mut content = content(Visibility::Paid);
        content.program_id = Some(Uuid::new_v4());
        viewer.subscribed_professors.push(content.author_id);
        assert_eq!(decide(&viewer, &content, Utc::now()), Access::Full);
    }

    #[test]
    fn private_and_unknown_visibility_stay_locked() {
        let viewer = viewer();
        assert_eq!(
            decide(&viewer, &content(Visibility::Private), Utc::now()),
            Access::Locked
        );

        let unknown = Content {
            author_id: Uuid::new_v4(),
            visibility: Visibility::parse("experimental"),
            program_id: None,
        };
        assert_eq!(decide(&viewer, &unknown, Utc::now()), Access::Locked);
    }
}
