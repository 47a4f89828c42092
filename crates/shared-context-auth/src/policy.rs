//! Authorization Policy: the single visibility rule shared by every
//! read path in the Message Engine, plus the explicit-filter restriction
//! tools may layer on top of it.

use shared_context_protocol::{Identity, Message, Visibility};

/// A caller-supplied narrowing of the visibility rule (`search_scope`,
/// `visibility_filter` tool arguments). `All` applies no extra restriction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityFilter {
    All,
    Public,
    Private,
    AgentOnly,
}

impl VisibilityFilter {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "all" => Some(Self::All),
            "public" => Some(Self::Public),
            "private" => Some(Self::Private),
            "agent_only" => Some(Self::AgentOnly),
            _ => None,
        }
    }

    fn matches(self, visibility: Visibility) -> bool {
        match self {
            Self::All => true,
            Self::Public => visibility == Visibility::Public,
            Self::Private => visibility == Visibility::Private,
            Self::AgentOnly => visibility == Visibility::AgentOnly,
        }
    }
}

/// Admins see everything; everyone else sees public
/// messages plus their own private/agent-only/admin-only messages.
/// `admin_only` messages are visible to admins and to the original sender
/// only — nobody else.
#[must_use]
pub fn is_visible(identity: &Identity, message: &Message) -> bool {
    if identity.is_admin() {
        return true;
    }
    match message.visibility {
        Visibility::Public => true,
        Visibility::Private | Visibility::AgentOnly | Visibility::AdminOnly => message.sender == identity.agent_id,
    }
}

/// Combines the baseline visibility rule with an optional explicit filter.
/// A filter narrows what is returned; it never grants access the baseline
/// rule would deny.
#[must_use]
pub fn is_visible_with_filter(identity: &Identity, message: &Message, filter: Option<VisibilityFilter>) -> bool {
    is_visible(identity, message) && filter.map_or(true, |f| f.matches(message.visibility))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shared_context_protocol::{MessageType, Permission};
    use std::collections::HashSet;

    fn message(sender: &str, visibility: Visibility) -> Message {
        Message {
            id: 1,
            session_id: "session_0000000000000000".into(),
            sender: sender.into(),
            content: "hi".into(),
            visibility,
            message_type: MessageType::AgentResponse,
            metadata: serde_json::json!({}),
            timestamp: Utc::now(),
            parent_message_id: None,
        }
    }

    #[test]
    fn admin_sees_everything() {
        let admin = Identity::new("admin-1", "admin", HashSet::new(), "t1");
        assert!(is_visible(&admin, &message("other", Visibility::AdminOnly)));
        assert!(is_visible(&admin, &message("other", Visibility::Private)));
    }

    #[test]
    fn public_messages_are_visible_to_anyone() {
        let caller = Identity::new("a1", "generic", HashSet::new(), "t1");
        assert!(is_visible(&caller, &message("someone-else", Visibility::Public)));
    }

    #[test]
    fn private_messages_visible_only_to_sender() {
        let caller = Identity::new("a1", "generic", HashSet::new(), "t1");
        assert!(is_visible(&caller, &message("a1", Visibility::Private)));
        assert!(!is_visible(&caller, &message("a2", Visibility::Private)));
    }

    #[test]
    fn admin_only_visible_to_admins_and_sender_only() {
        let caller = Identity::new("a1", "generic", HashSet::from([Permission::Admin]), "t1");
        // holding the Admin permission directly also satisfies is_admin()
        assert!(is_visible(&caller, &message("a1", Visibility::AdminOnly)));
        let sender = Identity::new("a2", "generic", HashSet::new(), "t2");
        assert!(is_visible(&sender, &message("a2", Visibility::AdminOnly)));
        let other = Identity::new("a3", "generic", HashSet::new(), "t3");
        assert!(!is_visible(&other, &message("a2", Visibility::AdminOnly)));
    }

    #[test]
    fn explicit_filter_cannot_widen_access() {
        let caller = Identity::new("a1", "generic", HashSet::new(), "t1");
        let msg = message("a2", Visibility::Private);
        assert!(!is_visible_with_filter(&caller, &msg, Some(VisibilityFilter::All)));
    }
}
