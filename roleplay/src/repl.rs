//! Line-oriented play loop.
//!
//! Each line is one action for the acting character. Lines starting with
//! `#` are commands (quit, status, chronicle, describe, as, reset, help).

use roleplay_core::{GameSession, SessionError, TurnResult};
use std::io::{self, BufRead, Write};

const HELP: &[(&str, &str)] = &[
    ("#quit", "Exit"),
    ("#status", "Show the scene and every character"),
    ("#chronicle", "Show the story so far"),
    ("#describe", "Ask the model to describe the world"),
    ("#as <name>", "Switch the character you play"),
    ("#reset", "Clear the chronicle and start a new story"),
    ("#help", "Show this help"),
];

fn print_help() {
    for (command, text) in HELP {
        println!("  {command:<12} - {text}");
    }
    println!("  (anything else is your character's action)");
}

/// Ask on stdin until a known character name is given.
fn choose_character(names: &[String]) -> Option<String> {
    println!("Characters: {}", names.join(", "));
    let stdin = io::stdin();
    loop {
        print!("Who do you play? ");
        io::stdout().flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => return None,
            Ok(_) => {}
        }
        let choice = line.trim();
        if let Some(name) = names.iter().find(|n| n.eq_ignore_ascii_case(choice)) {
            return Some(name.clone());
        }
        println!("[ERROR] No character named '{choice}'");
    }
}

fn print_turn(acting: &str, result: &TurnResult) {
    if !result.success {
        println!(
            "[ERROR] Turn failed: {}",
            result.error_message.as_deref().unwrap_or("unknown error")
        );
        println!("[INFO] Nothing was saved. Try again with the same or a different action.");
        return;
    }

    println!("[{}]", result.counterpart.to_uppercase());
    for para in result.narrative.split("\n\n") {
        println!("{para}");
    }
    println!();
    if !result.narrative_verified {
        println!("[WARN] The narrative could not be verified; showing the raw actions.");
    }
    if let Some(message) = &result.error_message {
        println!("[WARN] {message}");
    }
    println!("[TURN] {} -> {}", acting, result.counterpart);
}

/// Run the play loop until `#quit` or end of input.
pub async fn run(session: &GameSession, acting: Option<String>) -> Result<(), SessionError> {
    let names = session.characters().await?;

    println!("=== Role-play ===");
    let mut acting = match acting {
        Some(name) if names.contains(&name) => name,
        Some(name) => {
            println!("[ERROR] No character named '{name}'");
            match choose_character(&names) {
                Some(name) => name,
                None => return Ok(()),
            }
        }
        None => match choose_character(&names) {
            Some(name) => name,
            None => return Ok(()),
        },
    };

    println!("You are playing {acting}.");
    println!();
    println!("Commands:");
    print_help();
    println!();
    println!("Enter your actions (one per line):");
    println!();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("Error reading input: {e}");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('#') {
            let parts: Vec<&str> = command.split_whitespace().collect();
            match parts.first().copied() {
                Some("quit") | Some("exit") => {
                    println!("Goodbye!");
                    break;
                }
                Some("status") => match session.world().await {
                    Ok(world) => {
                        println!("[STATUS]");
                        println!("  {}", world.scene_context());
                        for line in world.characters_snapshot().lines() {
                            println!("  {line}");
                        }
                        println!("  You are playing {acting}.");
                    }
                    Err(e) => println!("[ERROR] {e}"),
                },
                Some("chronicle") => match session.chronicle().await {
                    Ok(entries) if entries.is_empty() => println!("[CHRONICLE] (empty)"),
                    Ok(entries) => {
                        println!("[CHRONICLE]");
                        for entry in entries {
                            println!("{entry}");
                        }
                    }
                    Err(e) => println!("[ERROR] {e}"),
                },
                Some("describe") => match session.describe_world().await {
                    Ok(description) => {
                        println!("[WORLD]");
                        println!("{description}");
                    }
                    Err(e) => println!("[ERROR] {e}"),
                },
                Some("as") => match parts.get(1) {
                    Some(name) => match names.iter().find(|n| n.eq_ignore_ascii_case(name)) {
                        Some(name) => {
                            acting = name.clone();
                            println!("[INFO] You are now playing {acting}.");
                        }
                        None => println!("[ERROR] No character named '{name}'"),
                    },
                    None => println!("[ERROR] Usage: #as <name>"),
                },
                Some("reset") => match session.reset_chronicle().await {
                    Ok(()) => println!("[INFO] Chronicle cleared."),
                    Err(e) => println!("[ERROR] {e}"),
                },
                Some("help") => {
                    println!("[HELP]");
                    print_help();
                }
                _ => {
                    println!("[ERROR] Unknown command. Type #help for help.");
                }
            }
            stdout.flush().ok();
            continue;
        }

        print!("[PROCESSING]");
        stdout.flush().ok();

        let result = session.play(&acting, line).await;

        print!("\r            \r");
        stdout.flush().ok();
        print_turn(&acting, &result);
    }

    Ok(())
}
