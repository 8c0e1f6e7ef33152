//! Chat command parsing.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Default window for `/analytics` without an argument.
pub const DEFAULT_ANALYTICS_DAYS: u32 = 7;
pub const MAX_ANALYTICS_DAYS: u32 = 365;
/// Longest premium grant, about a hundred years.
pub const MAX_PREMIUM_DAYS: u32 = 36_500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    Start,
    Help,
    Login { session: &'a str },
    Logout,
    Status,
    /// Replace the account's ads with this one.
    SetAd { text: &'a str },
    /// Add another ad to the rotation.
    AddAd { text: &'a str },
    ViewAd,
    MyAds,
    /// Switch one of the caller's ads in or out of the rotation.
    ToggleAd { ad_id: i64 },
    AddGroup { group_id: i64, name: &'a str },
    RemoveGroup { group_id: i64 },
    ListGroups,
    GroupStats { group_id: i64 },
    Pause { group_id: i64 },
    Resume { group_id: i64 },
    Priority { group_id: i64, priority: i32 },
    StartAds,
    StopAds,
    Delay(Option<u64>),
    Analytics { days: u32 },
    /// `None` turns the log channel off.
    LogChannel(Option<i64>),

    // Operator
    Premium { user_id: i64, days: u32 },
    Revoke { user_id: i64 },
    Schedule { user_id: i64, ad_id: i64, at: DateTime<Utc> },
    OwnerAd { text: &'a str },
    Broadcast { ad_id: i64 },

    /// Known command, bad arguments.
    Usage(&'static str),
    Unknown(&'a str),
}

impl<'a> Command<'a> {
    /// Parse a message body. `None` when it is not a command at all.
    ///
    /// Accepts the `/cmd@BotName` form groups produce and is
    /// case-insensitive on the command name.
    pub fn parse(raw: &'a str) -> Option<Self> {
        let raw = raw.trim_start();
        let body = raw.strip_prefix('/')?;
        let (head, rest) = match body.find(char::is_whitespace) {
            Some(i) => (&body[..i], body[i..].trim()),
            None => (body, ""),
        };
        let name = head.split('@').next().unwrap_or(head);
        if name.is_empty() {
            return None;
        }
        let args: Vec<&str> = rest.split_whitespace().collect();

        let cmd = match name.to_ascii_lowercase().as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "login" => match args.as_slice() {
                [session] => Command::Login { session: *session },
                _ => Command::Usage("/login <session token>"),
            },
            "logout" => Command::Logout,
            "status" => Command::Status,
            "setad" => Command::SetAd { text: rest },
            "addad" => Command::AddAd { text: rest },
            "viewad" => Command::ViewAd,
            "myads" => Command::MyAds,
            "togglead" => match parse_one::<i64>(&args) {
                Some(ad_id) => Command::ToggleAd { ad_id },
                None => Command::Usage("/togglead <ad id>"),
            },
            "addgroup" => {
                let parsed = args.first().and_then(|id| id.parse::<i64>().ok());
                let name = rest
                    .split_once(char::is_whitespace)
                    .map(|(_, name)| name.trim())
                    .unwrap_or("");
                match parsed {
                    Some(group_id) if !name.is_empty() => Command::AddGroup { group_id, name },
                    _ => Command::Usage("/addgroup <group id> <name>"),
                }
            }
            "removegroup" => match parse_one::<i64>(&args) {
                Some(group_id) => Command::RemoveGroup { group_id },
                None => Command::Usage("/removegroup <group id>"),
            },
            "listgroups" => Command::ListGroups,
            "groupstats" => match parse_one::<i64>(&args) {
                Some(group_id) => Command::GroupStats { group_id },
                None => Command::Usage("/groupstats <group id>"),
            },
            "pause" => match parse_one::<i64>(&args) {
                Some(group_id) => Command::Pause { group_id },
                None => Command::Usage("/pause <group id>"),
            },
            "resume" => match parse_one::<i64>(&args) {
                Some(group_id) => Command::Resume { group_id },
                None => Command::Usage("/resume <group id>"),
            },
            "priority" => match args.as_slice() {
                [id, n] => match (id.parse(), n.parse()) {
                    (Ok(group_id), Ok(priority)) => Command::Priority { group_id, priority },
                    _ => Command::Usage("/priority <group id> <number>"),
                },
                _ => Command::Usage("/priority <group id> <number>"),
            },
            "start_ads" => Command::StartAds,
            "stop_ads" => Command::StopAds,
            "delay" => match args.as_slice() {
                [] => Command::Delay(None),
                [secs] => match secs.parse() {
                    Ok(secs) => Command::Delay(Some(secs)),
                    Err(_) => Command::Usage("/delay <seconds>"),
                },
                _ => Command::Usage("/delay <seconds>"),
            },
            "analytics" => match args.as_slice() {
                [] => Command::Analytics {
                    days: DEFAULT_ANALYTICS_DAYS,
                },
                [days] => match days.parse::<u32>() {
                    Ok(days) if (1..=MAX_ANALYTICS_DAYS).contains(&days) => {
                        Command::Analytics { days }
                    }
                    _ => Command::Usage("/analytics [days, 1-365]"),
                },
                _ => Command::Usage("/analytics [days, 1-365]"),
            },
            "logchannel" => match args.as_slice() {
                ["off"] => Command::LogChannel(None),
                [id] => match id.parse() {
                    Ok(id) => Command::LogChannel(Some(id)),
                    Err(_) => Command::Usage("/logchannel <channel id | off>"),
                },
                _ => Command::Usage("/logchannel <channel id | off>"),
            },
            "premium" => match args.as_slice() {
                [user, days] => match (user.parse(), days.parse::<u32>()) {
                    (Ok(user_id), Ok(days)) if (1..=MAX_PREMIUM_DAYS).contains(&days) => {
                        Command::Premium { user_id, days }
                    }
                    _ => Command::Usage("/premium <user id> <days, 1-36500>"),
                },
                _ => Command::Usage("/premium <user id> <days, 1-36500>"),
            },
            "revoke" => match parse_one::<i64>(&args) {
                Some(user_id) => Command::Revoke { user_id },
                None => Command::Usage("/revoke <user id>"),
            },
            "schedule" => match args.as_slice() {
                [user, ad, date, time] => {
                    let at = NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y-%m-%d %H:%M")
                        .ok()
                        .map(|naive| naive.and_utc());
                    match (user.parse(), ad.parse(), at) {
                        (Ok(user_id), Ok(ad_id), Some(at)) => Command::Schedule { user_id, ad_id, at },
                        _ => Command::Usage("/schedule <user id> <ad id> <YYYY-MM-DD HH:MM>"),
                    }
                }
                _ => Command::Usage("/schedule <user id> <ad id> <YYYY-MM-DD HH:MM>"),
            },
            "ownerad" => Command::OwnerAd { text: rest },
            "broadcast" => match parse_one::<i64>(&args) {
                Some(ad_id) => Command::Broadcast { ad_id },
                None => Command::Usage("/broadcast <ad id>"),
            },
            _ => Command::Unknown(name),
        };
        Some(cmd)
    }

    /// Commands only the operator may run.
    pub fn is_operator_only(&self) -> bool {
        matches!(
            self,
            Command::Premium { .. }
                | Command::Revoke { .. }
                | Command::Schedule { .. }
                | Command::OwnerAd { .. }
                | Command::Broadcast { .. }
        )
    }
}

fn parse_one<T: std::str::FromStr>(args: &[&str]) -> Option<T> {
    match args {
        [one] => one.parse().ok(),
        _ => None,
    }
}

pub const USER_HELP: &str = "\
🔐 Account
/login <session> - connect your account
/logout - disconnect and forget the session
/status - tier, ads, groups and automation state

📢 Ads
/setad <text> - set your ad (send a photo or video with this caption for media)
/addad <text> - add another ad to the rotation (premium)
/viewad - preview the next ad
/myads - list your active ads
/togglead <id> - take an ad out of the rotation or put it back

👥 Groups
/addgroup <id> <name> - add a destination
/removegroup <id> - remove a destination
/listgroups - list destinations
/groupstats <id> - all-time results for one group
/pause <id> | /resume <id> - skip or include a group
/priority <id> <n> - higher goes first

⚙️ Automation
/start_ads | /stop_ads - start or stop forwarding
/delay [seconds] - cycle delay (premium)
/analytics [days] - forwarding statistics, daily breakdown included
/logchannel <id | off> - copy a note of every send to a channel";

pub const OPERATOR_HELP: &str = "\
👑 Operator
/premium <user> <days> - grant premium
/revoke <user> - revoke premium
/schedule <user> <ad> <YYYY-MM-DD HH:MM> - one-shot campaign (UTC)
/ownerad <text> - save an operator ad
/broadcast <ad> - send an operator ad through free accounts";

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("/HELP"), Some(Command::Help));
        assert_eq!(Command::parse("/status@AdRelayBot"), Some(Command::Status));
        assert_eq!(Command::parse("hello there"), None);
        assert_eq!(Command::parse("/"), None);
        assert_eq!(Command::parse("/frobnicate x"), Some(Command::Unknown("frobnicate")));
    }

    #[test]
    fn test_parse_ad_text_keeps_formatting() {
        assert_eq!(
            Command::parse("/setad 🔥 Big sale\nLine two"),
            Some(Command::SetAd {
                text: "🔥 Big sale\nLine two"
            })
        );
        assert_eq!(Command::parse("/setad"), Some(Command::SetAd { text: "" }));
    }

    #[test]
    fn test_parse_group_commands() {
        assert_eq!(
            Command::parse("/addgroup -100123 Crypto Traders"),
            Some(Command::AddGroup {
                group_id: -100123,
                name: "Crypto Traders"
            })
        );
        assert!(matches!(Command::parse("/addgroup -100123"), Some(Command::Usage(_))));
        assert!(matches!(Command::parse("/addgroup abc Name"), Some(Command::Usage(_))));
        assert_eq!(
            Command::parse("/priority -5 3"),
            Some(Command::Priority {
                group_id: -5,
                priority: 3
            })
        );
        assert_eq!(Command::parse("/pause -5"), Some(Command::Pause { group_id: -5 }));
        assert_eq!(
            Command::parse("/removegroup -5"),
            Some(Command::RemoveGroup { group_id: -5 })
        );
        assert_eq!(
            Command::parse("/groupstats -5"),
            Some(Command::GroupStats { group_id: -5 })
        );
        assert!(matches!(Command::parse("/groupstats"), Some(Command::Usage(_))));
        assert_eq!(Command::parse("/togglead 12"), Some(Command::ToggleAd { ad_id: 12 }));
    }

    #[test]
    fn test_parse_optional_arguments() {
        assert_eq!(Command::parse("/delay"), Some(Command::Delay(None)));
        assert_eq!(Command::parse("/delay 45"), Some(Command::Delay(Some(45))));
        assert!(matches!(Command::parse("/delay soon"), Some(Command::Usage(_))));
        assert_eq!(
            Command::parse("/analytics"),
            Some(Command::Analytics {
                days: DEFAULT_ANALYTICS_DAYS
            })
        );
        assert!(matches!(Command::parse("/analytics 0"), Some(Command::Usage(_))));
        assert_eq!(
            Command::parse("/analytics 365"),
            Some(Command::Analytics { days: 365 })
        );
        assert!(matches!(Command::parse("/analytics 366"), Some(Command::Usage(_))));
        assert!(matches!(
            Command::parse("/analytics 4000000000"),
            Some(Command::Usage(_))
        ));
        assert_eq!(Command::parse("/logchannel off"), Some(Command::LogChannel(None)));
        assert_eq!(
            Command::parse("/logchannel -1009"),
            Some(Command::LogChannel(Some(-1009)))
        );
    }

    #[test]
    fn test_parse_operator_commands() {
        let cmd = Command::parse("/schedule 42 7 2026-11-01 09:30").unwrap();
        assert_eq!(
            cmd,
            Command::Schedule {
                user_id: 42,
                ad_id: 7,
                at: Utc.with_ymd_and_hms(2026, 11, 1, 9, 30, 0).unwrap()
            }
        );
        assert!(cmd.is_operator_only());
        assert!(matches!(
            Command::parse("/schedule 42 7 tomorrow"),
            Some(Command::Usage(_))
        ));
        assert_eq!(
            Command::parse("/premium 42 30"),
            Some(Command::Premium {
                user_id: 42,
                days: 30
            })
        );
        assert!(matches!(
            Command::parse("/premium 42 36501"),
            Some(Command::Usage(_))
        ));
        assert!(matches!(
            Command::parse("/premium 5 4000000000"),
            Some(Command::Usage(_))
        ));
        assert!(!Command::Status.is_operator_only());
    }
}
