//! Console rendering for sessions and speech.

use std::sync::Arc;

use agora_core::config::CatalogConfig;
use agora_core::speech::SpeechCallback;
use agora_core::{
    DebateRecord, DebateState, Message, Sender, SessionCallback, SessionEvent, SessionMachine, SpeechEvent, View,
    Winner,
};
use colored::Colorize;

const WIDTH: usize = 70;

fn rule_heavy() -> String {
    "═".repeat(WIDTH)
}

fn rule_light() -> String {
    "─".repeat(WIDTH)
}

pub fn print_banner() {
    println!();
    println!("{}", rule_heavy().bright_blue());
    println!("{}", "  Agora AI - debate an AI opponent".bright_blue().bold());
    println!("{}", rule_heavy().bright_blue());
}

/// The itemized screen shown instead of the app when required settings are missing.
pub fn print_configuration_error(missing: &[String]) {
    eprintln!();
    eprintln!("{}", rule_heavy().red());
    eprintln!("{}", "  Configuration error".red().bold());
    eprintln!("{}", rule_heavy().red());
    eprintln!();
    eprintln!("Agora cannot start because required configuration is missing:");
    eprintln!();
    for item in missing {
        eprintln!("  {} {}", "✗".red(), item);
    }
    eprintln!();
    eprintln!(
        "{}",
        "Set them in the environment, a .env file, or the [chat]/[google] sections of the config file.".dimmed()
    );
    eprintln!();
}

pub fn print_setup(machine: &SessionMachine, catalog: &CatalogConfig) {
    println!();
    match machine.profile() {
        Some(profile) => println!("{} {} <{}>", "Signed in as".dimmed(), profile.name.bright_cyan(), profile.email),
        None if machine.has_auth() => println!("{}", "Not signed in; history is kept on this machine.".dimmed()),
        None => {}
    }

    println!();
    println!("{}", "Suggested topics:".bold());
    for (i, topic) in catalog.suggested_topics.iter().enumerate() {
        println!("  {}. {}", i + 1, topic);
    }
    println!();
    println!("{} {}", "Personas:".bold(), catalog.personas.join(", "));

    println!();
    println!("{}", "History:".bold());
    if machine.history().is_empty() {
        println!("  {}", "No debates yet.".dimmed());
    }
    for (i, record) in machine.history().iter().enumerate() {
        println!(
            "  {}. [{}] {} {}",
            i + 1,
            badge(&record.winner),
            record.settings().topic,
            record.timestamp.format("%Y-%m-%d %H:%M").to_string().dimmed()
        );
    }

    println!();
    if machine.active().is_some() {
        println!("{}", "A debate is in progress; type `resume` to return to it.".yellow());
    }
    let auth_command = match (machine.has_auth(), machine.profile().is_some()) {
        (false, _) => "",
        (true, false) => ", login",
        (true, true) => ", logout",
    };
    println!(
        "{} new, view <n>, resume{}, quit",
        "Commands:".dimmed(),
        auth_command
    );
}

pub fn print_debate_header(state: &DebateState) {
    println!();
    println!("{}", rule_heavy().bright_blue());
    println!("{} {}", "  Topic:".bold(), state.settings.topic.bright_white());
    println!(
        "  {} {}   {} {} ({})",
        "You:".bold(),
        state.settings.user_stance.display_name().bright_green(),
        "Agora:".bold(),
        state.ai_stance().display_name().bright_red(),
        state.settings.ai_persona.yellow()
    );
    println!("{}", rule_heavy().bright_blue());
    println!(
        "{}",
        "Type your argument and press enter. /end to finish, /replay and /stop for audio.".dimmed()
    );
    println!();
}

pub fn print_transcript(messages: &[Message]) {
    for message in messages {
        print_message(message);
    }
}

pub fn print_message(message: &Message) {
    let speaker = match message.sender {
        Sender::User => "You".bright_green().bold(),
        Sender::Ai => "Agora".bright_red().bold(),
    };
    println!("{} {}", "▶".bright_cyan(), speaker);
    for line in textwrap(&message.text, WIDTH - 4).lines() {
        println!("  {}", line);
    }
    if !message.sources().is_empty() {
        println!("  {}", "Sources:".dimmed());
        for source in message.sources() {
            println!("    {} {}", "-".dimmed(), source.title);
            println!("      {}", source.uri.dimmed().underline());
        }
    }
    println!();
}

pub fn print_record(record: &DebateRecord) {
    println!();
    println!("{}", rule_heavy().bright_magenta());
    println!("{} {}", "  Topic:".bold(), record.settings().topic.bright_white());
    println!(
        "  {} {}   {} {}",
        "Result:".bold(),
        badge(&record.winner),
        "Persona:".bold(),
        record.settings().ai_persona.yellow()
    );
    println!("{}", rule_heavy().bright_magenta());
    println!("{}", "Judgement:".bold());
    for line in textwrap(&record.judgement, WIDTH - 4).lines() {
        println!("  {}", line);
    }
    println!("{}", rule_light().dimmed());
    print_transcript(record.messages());
    println!("{} play <n>, back", "Commands:".dimmed());
}

fn print_verdict(record: &DebateRecord) {
    println!();
    println!("{}", rule_heavy().bright_green());
    let headline = match record.winner {
        Winner::User => "You won the debate!",
        Winner::Ai => "Agora won the debate.",
        Winner::Draw => "The debate ended in a draw.",
    };
    println!("{}", format!("  {}", headline).bright_green().bold());
    for line in textwrap(&record.judgement, WIDTH - 4).lines() {
        println!("  {}", line);
    }
    println!("{}", rule_heavy().bright_green());
}

fn badge(winner: &Winner) -> colored::ColoredString {
    match winner {
        Winner::User => winner.badge().bright_green(),
        Winner::Ai => winner.badge().bright_red(),
        Winner::Draw => winner.badge().yellow(),
    }
}

/// Create a callback that prints session events to the console.
pub fn create_console_callback() -> SessionCallback {
    Box::new(move |event| match event {
        SessionEvent::MessageAppended(message) => {
            // The user's own text is already on screen.
            if message.sender == Sender::Ai {
                print_message(&message);
            }
        }
        SessionEvent::TypingChanged(true) => {
            println!("{}", "Agora is typing...".dimmed().italic());
        }
        SessionEvent::TypingChanged(false) => {}
        SessionEvent::ViewChanged(View::Judging) => {
            println!();
            println!("{}", "The judge is deliberating...".bright_magenta().italic());
        }
        SessionEvent::ViewChanged(_) => {}
        SessionEvent::RecordCreated(record) => print_verdict(&record),
        SessionEvent::ProfileChanged(Some(profile)) => {
            println!("{} {}", "Signed in as".dimmed(), profile.name.bright_cyan());
        }
        SessionEvent::ProfileChanged(None) => {}
        SessionEvent::HistoryReplaced(count) => {
            tracing::debug!(count, "history replaced");
        }
    })
}

/// Create a callback that reports speech progress.
#[cfg_attr(not(feature = "voice"), allow(dead_code))]
pub fn create_speech_callback() -> SpeechCallback {
    Arc::new(move |event| match event {
        SpeechEvent::Finished { path, .. } => {
            println!("{} {}", "Audio saved to".dimmed(), path.display().to_string().dimmed());
        }
        SpeechEvent::Failed { error, .. } => {
            eprintln!("{} {}", "Speech failed:".yellow(), error);
        }
        SpeechEvent::Started { .. } | SpeechEvent::Chunk { .. } | SpeechEvent::Cancelled { .. } => {}
    })
}

/// Simple text wrapping that keeps paragraph breaks.
pub fn textwrap(text: &str, width: usize) -> String {
    text.lines()
        .map(|line| wrap_line(line, width))
        .collect::<Vec<_>>()
        .join("\n")
}

fn wrap_line(text: &str, width: usize) -> String {
    let mut result = String::new();
    let mut current_line_len = 0;

    for word in text.split_whitespace() {
        if current_line_len + word.len() + 1 > width && current_line_len > 0 {
            result.push('\n');
            current_line_len = 0;
        }
        if current_line_len > 0 {
            result.push(' ');
            current_line_len += 1;
        }
        result.push_str(word);
        current_line_len += word.len();
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_textwrap_breaks_long_lines() {
        let wrapped = textwrap("one two three four five six", 10);
        assert!(wrapped.lines().all(|l| l.len() <= 10));
        assert_eq!(wrapped.split_whitespace().count(), 6);
    }

    #[test]
    fn test_textwrap_keeps_paragraphs() {
        assert_eq!(textwrap("first\n\nsecond", 20), "first\n\nsecond");
    }
}
