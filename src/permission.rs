/// Pure permission rules, built once from configuration.
///
/// Evaluation is side-effect-free: denial is a `false`, never an error, and
/// the caller decides how to phrase it.
pub struct PermissionPolicy {
    allowed_channels: Vec<String>,
    chat_channels: Vec<String>,
    owner_commands: Vec<String>,
    privileged_commands: Vec<String>,
}

impl PermissionPolicy {
    pub fn new(
        allowed_channels: Vec<String>,
        chat_channels: Vec<String>,
        owner_commands: Vec<String>,
        privileged_commands: Vec<String>,
    ) -> Self {
        Self {
            allowed_channels,
            chat_channels,
            owner_commands,
            privileged_commands,
        }
    }

    /// First match wins: owner-only commands require the guild owner,
    /// privileged commands require a role in the moderator set, everything
    /// else is public.
    pub fn has_permission(
        &self,
        member_id: &str,
        member_roles: &[String],
        command_name: &str,
        moderator_roles: &[String],
        owner_id: &str,
    ) -> bool {
        if self.is_owner_command(command_name) {
            return Self::is_owner(owner_id, member_id);
        }
        if self.is_privileged_command(command_name) {
            return Self::has_privileged_role(member_roles, moderator_roles);
        }
        true
    }

    pub fn has_privileged_role(role_ids: &[String], privileged_roles: &[String]) -> bool {
        privileged_roles.iter().any(|role| role_ids.contains(role))
    }

    pub fn is_owner_command(&self, command_name: &str) -> bool {
        self.owner_commands
            .iter()
            .any(|cmd| cmd.eq_ignore_ascii_case(command_name))
    }

    pub fn is_privileged_command(&self, command_name: &str) -> bool {
        self.privileged_commands
            .iter()
            .any(|cmd| cmd.eq_ignore_ascii_case(command_name))
    }

    /// Whether lifecycle events from this channel are synchronized at all.
    /// Events from channels outside the allowlist are silently ignored.
    pub fn is_allowed_channel(&self, channel_id: &str) -> bool {
        self.allowed_channels
            .iter()
            .any(|channel| channel == channel_id)
    }

    /// Whether the assistant chats in this channel. An empty list means no
    /// restriction.
    pub fn is_chat_channel(&self, channel_id: &str) -> bool {
        self.chat_channels.is_empty()
            || self.chat_channels.iter().any(|channel| channel == channel_id)
    }

    pub fn is_owner(owner_id: &str, member_id: &str) -> bool {
        !owner_id.is_empty() && owner_id == member_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> PermissionPolicy {
        PermissionPolicy::new(
            vec!["chan-1".into(), "chan-2".into()],
            vec![],
            vec!["setup".into(), "update".into()],
            vec!["fetch".into(), "delete".into(), "addrole".into()],
        )
    }

    fn roles(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_permission_matrix() {
        let policy = policy();
        let mods = roles(&["mod-role"]);

        // Owner-only: only the owner passes, moderator roles do not help.
        assert!(policy.has_permission("owner", &roles(&["mod-role"]), "setup", &mods, "owner"));
        assert!(!policy.has_permission("member", &roles(&["mod-role"]), "setup", &mods, "owner"));
        assert!(!policy.has_permission("member", &[], "update", &mods, "owner"));

        // Privileged: any intersecting role passes, owner status does not help.
        assert!(policy.has_permission("member", &roles(&["mod-role"]), "fetch", &mods, "owner"));
        assert!(policy.has_permission(
            "member",
            &roles(&["other", "mod-role"]),
            "delete",
            &mods,
            "owner"
        ));
        assert!(!policy.has_permission("member", &roles(&["other"]), "addrole", &mods, "owner"));
        assert!(!policy.has_permission("owner", &[], "fetch", &mods, "owner"));

        // Public: everyone passes.
        assert!(policy.has_permission("member", &[], "ask", &mods, "owner"));
        assert!(policy.has_permission("member", &[], "help", &[], "owner"));
    }

    #[test]
    fn test_command_match_is_case_insensitive() {
        let policy = policy();
        assert!(policy.is_owner_command("Setup"));
        assert!(policy.is_privileged_command("FETCH"));
        assert!(!policy.is_privileged_command("ask"));
    }

    #[test]
    fn test_channel_allowlist() {
        let policy = policy();
        assert!(policy.is_allowed_channel("chan-1"));
        assert!(policy.is_allowed_channel("chan-2"));
        assert!(!policy.is_allowed_channel("chan-9"));
        assert!(!policy.is_allowed_channel(""));
    }

    #[test]
    fn test_chat_channels_empty_means_unrestricted() {
        let open = policy();
        assert!(open.is_chat_channel("anywhere"));

        let restricted = PermissionPolicy::new(vec![], vec!["chat-1".into()], vec![], vec![]);
        assert!(restricted.is_chat_channel("chat-1"));
        assert!(!restricted.is_chat_channel("chat-2"));
    }

    #[test]
    fn test_owner_check_rejects_empty_owner() {
        assert!(PermissionPolicy::is_owner("u1", "u1"));
        assert!(!PermissionPolicy::is_owner("u1", "u2"));
        assert!(!PermissionPolicy::is_owner("", ""));
    }
}
