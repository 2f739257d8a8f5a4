//! Admin command parsing
//!
//! Pure text-to-enum parsing; the dispatch layer owns the state mutations
//! and reply formatting. Unknown or malformed commands parse to `None` and
//! are ignored, so stray slash-text in channels never does anything.

/// A recognized admin command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Start,
    Status,
    SetStat(i64),
    SetDisplay(i64),
    /// `None` asks for the usage text with the current value
    Cooldown(Option<u32>),
    Interval(Option<u32>),
    Scheduler(SchedulerAction),
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerAction {
    Start,
    Stop,
    Status,
    Generate,
    Help,
}

/// Parse one message as an admin command.
///
/// Commands may carry a `@botname` suffix the way Telegram clients append
/// them in groups.
pub fn parse(text: &str) -> Option<AdminCommand> {
    let mut parts = text.split_whitespace();
    let head = parts.next()?;
    if !head.starts_with('/') {
        return None;
    }
    let command = head.split('@').next().unwrap_or(head);

    match command {
        "/start" => Some(AdminCommand::Start),
        "/status" => Some(AdminCommand::Status),
        "/set_stat" => parts.next()?.parse().ok().map(AdminCommand::SetStat),
        "/set_display" => parts.next()?.parse().ok().map(AdminCommand::SetDisplay),
        "/cooldown" => match parts.next() {
            Some(arg) => arg.parse().ok().map(|v| AdminCommand::Cooldown(Some(v))),
            None => Some(AdminCommand::Cooldown(None)),
        },
        "/intervalle" => match parts.next() {
            Some(arg) => arg.parse().ok().map(|v| AdminCommand::Interval(Some(v))),
            None => Some(AdminCommand::Interval(None)),
        },
        "/scheduler" => {
            let action = match parts.next() {
                Some("start") => SchedulerAction::Start,
                Some("stop") => SchedulerAction::Stop,
                Some("status") => SchedulerAction::Status,
                Some("generate") => SchedulerAction::Generate,
                _ => SchedulerAction::Help,
            };
            Some(AdminCommand::Scheduler(action))
        }
        "/reset" => Some(AdminCommand::Reset),
        _ => None,
    }
}
