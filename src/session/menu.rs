//! Parsing of chat input into commands and menu selections.

use std::fmt;

/// Username and password taken from a `/login` command
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Outcome of reading a message as a `/login` command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginCommand {
    NotLogin,
    MissingArguments,
    Valid(Credentials),
}

/// Parse `/login <user> <pass>`. Tokens after the password are ignored.
pub fn parse_login_command(text: &str) -> LoginCommand {
    let mut tokens = text.split_whitespace();
    if tokens.next() != Some("/login") {
        return LoginCommand::NotLogin;
    }

    match (tokens.next(), tokens.next()) {
        (Some(username), Some(password)) => LoginCommand::Valid(Credentials {
            username: username.to_string(),
            password: password.to_string(),
        }),
        _ => LoginCommand::MissingArguments,
    }
}

/// Entries of the post-login menu, in display order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MenuOption {
    Attendance,
    Result,
    AdmitCard,
    Timetable,
    Others,
}

impl MenuOption {
    pub const ALL: [MenuOption; 5] = [
        MenuOption::Attendance,
        MenuOption::Result,
        MenuOption::AdmitCard,
        MenuOption::Timetable,
        MenuOption::Others,
    ];

    /// Localization key of the section name
    pub fn label_key(self) -> &'static str {
        match self {
            MenuOption::Attendance => "section-attendance",
            MenuOption::Result => "section-result",
            MenuOption::AdmitCard => "section-admit-card",
            MenuOption::Timetable => "section-timetable",
            MenuOption::Others => "section-others",
        }
    }
}

/// What a message means while the main menu is waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Option(MenuOption),
    Meme,
    Invalid,
}

pub fn parse_menu_choice(text: &str) -> MenuChoice {
    match select_option(&MenuOption::ALL, text) {
        Selection::Selected(option) => MenuChoice::Option(*option),
        Selection::Exit => MenuChoice::Meme,
        Selection::Invalid => MenuChoice::Invalid,
    }
}

/// Result of picking from a numbered list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection<'a, T> {
    Selected(&'a T),
    /// The `0` sentinel
    Exit,
    Invalid,
}

/// Pick `options[i - 1]` for input `i`; `0` is the exit sentinel
pub fn select_option<'a, T>(options: &'a [T], input: &str) -> Selection<'a, T> {
    let trimmed = input.trim();
    if !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Selection::Invalid;
    }

    match trimmed.parse::<usize>() {
        Ok(0) => Selection::Exit,
        Ok(index) => options
            .get(index - 1)
            .map_or(Selection::Invalid, Selection::Selected),
        Err(_) => Selection::Invalid,
    }
}

/// Answer to a yes/no confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Yes,
    No,
    Invalid,
}

pub fn parse_confirmation(text: &str) -> Confirmation {
    match text.trim().to_lowercase().as_str() {
        "yes" | "y" => Confirmation::Yes,
        "no" | "n" => Confirmation::No,
        _ => Confirmation::Invalid,
    }
}
