//! Commands and values accepted on the command line.

use std::fmt;
use std::str::FromStr;

/// What the invocation is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Read the status of everything.
    All,
    Locked,
    Charging,
    Climatisation,
    WindowHeating,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::All => "",
            Command::Locked => "locked",
            Command::Charging => "charging",
            Command::Climatisation => "climatisation",
            Command::WindowHeating => "window-heating",
        }
    }
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Ok(Command::All),
            "locked" => Ok(Command::Locked),
            "charging" => Ok(Command::Charging),
            "climatisation" => Ok(Command::Climatisation),
            "window-heating" => Ok(Command::WindowHeating),
            other => Err(format!("unknown command: {other}")),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::All => f.write_str("status"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Requested target state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandValue {
    Enable,
    Disable,
    QueryOnly,
}

impl CommandValue {
    /// Whether `current` already satisfies the request. An unknown state
    /// counts as off.
    pub fn is_satisfied_by(&self, current: Option<bool>) -> bool {
        let on = current.unwrap_or(false);
        match self {
            CommandValue::Enable => on,
            CommandValue::Disable => !on,
            CommandValue::QueryOnly => true,
        }
    }
}

impl FromStr for CommandValue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1" => Ok(CommandValue::Enable),
            "0" => Ok(CommandValue::Disable),
            "status" => Ok(CommandValue::QueryOnly),
            other => Err(format!("unknown value: {other} (expected 1, 0 or status)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_round_trip_names() {
        for command in [
            Command::All,
            Command::Locked,
            Command::Charging,
            Command::Climatisation,
            Command::WindowHeating,
        ] {
            assert_eq!(command.as_str().parse::<Command>().unwrap(), command);
        }
        assert!("lock".parse::<Command>().is_err());
    }

    #[test]
    fn test_values() {
        assert_eq!("1".parse::<CommandValue>().unwrap(), CommandValue::Enable);
        assert_eq!("0".parse::<CommandValue>().unwrap(), CommandValue::Disable);
        assert_eq!("status".parse::<CommandValue>().unwrap(), CommandValue::QueryOnly);
        assert!("on".parse::<CommandValue>().is_err());
    }

    #[test]
    fn test_is_satisfied_by() {
        assert!(CommandValue::Enable.is_satisfied_by(Some(true)));
        assert!(!CommandValue::Enable.is_satisfied_by(None));
        assert!(CommandValue::Disable.is_satisfied_by(None));
        assert!(!CommandValue::Disable.is_satisfied_by(Some(true)));
        assert!(CommandValue::QueryOnly.is_satisfied_by(Some(false)));
    }
}
