use anyhow::Result;
use serde_json::json;
use std::process::ExitCode;

use super::{print_json_line, Command};
use crate::lifecycle::{classify, rider_table, StateName, TransitionClass};

/// Prints every legal transition with its class
pub struct TableCommand {
    pub json: bool,
}

impl Command for TableCommand {
    async fn execute(&self) -> Result<ExitCode> {
        let table = rider_table();

        if self.json {
            for rule in table.rules() {
                print_json_line(&json!({
                    "from": rule.from,
                    "to": rule.to,
                    "class": rule.class(),
                }))?;
            }
            return Ok(ExitCode::SUCCESS);
        }

        println!("{:<12} {:<12} {}", "FROM", "TO", "CLASS");
        for rule in table.rules() {
            println!(
                "{:<12} {:<12} {}",
                rule.from.as_str(),
                rule.to.as_str(),
                rule.class()
            );
        }
        println!();
        println!(
            "{} legal transitions; every other pair of states is illegal",
            table.len()
        );
        Ok(ExitCode::SUCCESS)
    }
}

/// Classifies one (from, to) pair
pub struct ClassifyCommand {
    pub from: String,
    pub to: String,
}

impl Command for ClassifyCommand {
    async fn execute(&self) -> Result<ExitCode> {
        let from: StateName = self.from.parse()?;
        let to: StateName = self.to.parse()?;
        let class = classify(from, to);

        println!("{class}");
        Ok(if class == TransitionClass::Illegal {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        })
    }
}
