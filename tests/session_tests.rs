use portal_bot::session::{
    parse_login_command, parse_menu_choice, LoginCommand, MenuChoice, MenuOption, MenuStage,
    Reply, SessionRegistry, UserId,
};
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reply_sent_before_wait_is_not_lost() {
        let registry = SessionRegistry::new();
        let user = UserId::from("1001");

        let waiter = registry.install_waiter(&user);
        registry.offer(&user, "1".to_string()).unwrap();

        let reply = registry.wait(waiter, Duration::from_secs(5)).await;
        assert_eq!(reply, Reply::Message("1".to_string()));
    }

    #[tokio::test]
    async fn test_each_user_gets_only_their_own_reply() {
        let registry = Arc::new(SessionRegistry::new());
        let users: Vec<UserId> = (0..8).map(|i| UserId::new(format!("user-{i}"))).collect();

        let waiters: Vec<_> = users
            .iter()
            .map(|user| {
                let waiter = registry.install_waiter(user);
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.wait(waiter, Duration::from_secs(5)).await })
            })
            .collect();

        for user in users.iter().rev() {
            registry.offer(user, format!("reply for {user}")).unwrap();
        }

        for (user, handle) in users.iter().zip(waiters) {
            assert_eq!(handle.await.unwrap(), Reply::Message(format!("reply for {user}")));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_slot_does_not_clear_its_replacement() {
        let registry = Arc::new(SessionRegistry::new());
        let user = UserId::from("1001");

        let stale = registry.install_waiter(&user);
        let fresh = registry.install_waiter(&user);

        // The stale waiter resolves at once: its sender was dropped on replacement
        assert_eq!(registry.wait(stale, Duration::from_secs(1)).await, Reply::Superseded);
        assert!(registry.has_waiter(&user));

        registry.offer(&user, "yes".to_string()).unwrap();
        assert_eq!(
            registry.wait(fresh, Duration::from_secs(60)).await,
            Reply::Message("yes".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_flow_cancels_pending_wait() {
        let registry = Arc::new(SessionRegistry::new());
        let user = UserId::from("1001");
        assert!(registry.begin_flow(&user));

        let waiter = registry.install_waiter(&user);
        let handle = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.wait(waiter, Duration::from_secs(120)).await })
        };

        registry.end_flow(&user);
        assert_eq!(handle.await.unwrap(), Reply::Superseded);
        assert_eq!(registry.stage(&user), MenuStage::Idle);
        assert_eq!(registry.active_sessions(), 0);
    }

    #[test]
    fn test_snapshot_tracks_flow_progress() {
        let registry = SessionRegistry::new();
        let user = UserId::from("1001");
        assert!(registry.snapshot(&user).is_none());

        registry.begin_flow(&user);
        registry.record_login_attempt(&user, 2);
        registry.set_stage(&user, MenuStage::AwaitingMenuChoice);

        let snapshot = registry.snapshot(&user).unwrap();
        assert_eq!(snapshot.login_attempts, 2);
        assert_eq!(snapshot.stage, MenuStage::AwaitingMenuChoice);
        assert!(snapshot.flow_active);
        assert!(!snapshot.awaiting_reply);
    }

    #[test]
    fn test_menu_parsing_from_chat_text() {
        assert_eq!(parse_menu_choice(" 1 "), MenuChoice::Option(MenuOption::Attendance));
        assert_eq!(parse_menu_choice("5"), MenuChoice::Option(MenuOption::Others));
        assert_eq!(parse_menu_choice("0"), MenuChoice::Meme);
        assert_eq!(parse_menu_choice("6"), MenuChoice::Invalid);
        assert_eq!(parse_menu_choice("one"), MenuChoice::Invalid);
        assert_eq!(parse_menu_choice(""), MenuChoice::Invalid);

        assert_eq!(parse_login_command("/login"), LoginCommand::MissingArguments);
        assert_eq!(parse_login_command("login a b"), LoginCommand::NotLogin);
    }
}
