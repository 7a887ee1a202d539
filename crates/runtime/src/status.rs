//! Per-tick status updates: the deterministic, kind-specific summary that
//! becomes the agent's next user turn.

use chrono::{DateTime, Utc};
use serde_json::Value;

use orc_domain::{ExperimentType, TimerStatus};

/// An unread message resolved for display.
#[derive(Debug, Clone)]
pub struct UnreadView {
    pub sender: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub broadcast: bool,
}

/// Everything a status update is built from.
pub struct StatusInput<'a> {
    pub experiment_type: &'a ExperimentType,
    pub private: &'a Value,
    pub public: &'a Value,
    pub time_remaining: u64,
    pub experiment_status: TimerStatus,
    pub unread: &'a [UnreadView],
    pub failures: String,
    /// HiddenProfiles: demand a final vote now.
    pub final_vote_due: bool,
    pub has_voted: bool,
}

fn minutes(seconds: u64) -> u64 {
    (seconds + 30) / 60
}

fn join_strings(value: &Value) -> String {
    let items: Vec<&str> = value
        .as_array()
        .map(|list| list.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    if items.is_empty() {
        "(none)".to_owned()
    } else {
        items.join(", ")
    }
}

fn unread_section(unread: &[UnreadView]) -> String {
    if unread.is_empty() {
        return "(none)".to_owned();
    }
    let mut sections: Vec<String> = Vec::new();

    let broadcasts: Vec<&UnreadView> = unread.iter().filter(|m| m.broadcast).collect();
    if !broadcasts.is_empty() {
        let mut lines = vec!["UNREAD BROADCAST MESSAGES:".to_owned()];
        for msg in broadcasts {
            lines.push(format!(
                "  FROM {} ({}): {}",
                msg.sender,
                msg.timestamp.format("%H:%M:%S"),
                msg.content
            ));
        }
        sections.push(lines.join("\n"));
    }

    let mut senders: Vec<&str> = unread
        .iter()
        .filter(|m| !m.broadcast)
        .map(|m| m.sender.as_str())
        .collect();
    senders.sort_unstable();
    senders.dedup();
    for sender in senders {
        let mut lines = vec![format!("UNREAD MESSAGES FROM {sender}:")];
        for msg in unread.iter().filter(|m| !m.broadcast && m.sender == sender) {
            lines.push(format!(
                "  ({}): {}",
                msg.timestamp.format("%H:%M:%S"),
                msg.content
            ));
        }
        sections.push(lines.join("\n"));
    }
    sections.join("\n\n")
}

fn participants_section(public: &Value) -> String {
    let rows: Vec<String> = public["participants"]
        .as_array()
        .map(|list| {
            list.iter()
                .filter_map(|p| {
                    let code = p["participant_code"].as_str()?;
                    let mut row = code.to_owned();
                    // Awareness extras are only serialized when enabled.
                    if let Some(money) = p["money"].as_i64() {
                        row.push_str(&format!(" (money ${money}"));
                        if let (Some(done), Some(total)) =
                            (p["orders_completed"].as_u64(), p["total_orders"].as_u64())
                        {
                            row.push_str(&format!(", orders {done}/{total}"));
                        }
                        if let Some(used) = p["specialty_production_used"].as_u64() {
                            row.push_str(&format!(", produced {used}"));
                        }
                        row.push(')');
                    }
                    Some(row)
                })
                .collect()
        })
        .unwrap_or_default();
    if rows.is_empty() {
        "(none)".to_owned()
    } else {
        rows.join("\n")
    }
}

fn production_section(private: &Value) -> String {
    let queue = private["production_queue"].as_array().cloned().unwrap_or_default();
    let in_progress = queue.iter().find(|e| e["status"] == "in_progress");
    let queued: Vec<&Value> = queue.iter().filter(|e| e["status"] == "queued").collect();
    match in_progress {
        Some(entry) => {
            let queue_info = if queued.is_empty() {
                String::new()
            } else {
                format!(" (+{} queued)", queued.len())
            };
            match entry["time_remaining"].as_i64() {
                Some(secs) if secs > 0 => format!(
                    "Producing {}x {} - {}s remaining{}",
                    entry["quantity"], entry["shape"].as_str().unwrap_or("?"), secs, queue_info
                ),
                _ => format!(
                    "Producing {}x {} - completing soon{}",
                    entry["quantity"], entry["shape"].as_str().unwrap_or("?"), queue_info
                ),
            }
        }
        None if !queued.is_empty() => format!(
            "Production queue: {} item(s) waiting; start the next one explicitly",
            queued.len()
        ),
        None => "No production in progress".to_owned(),
    }
}

fn offers_section(offers: &Value, received: bool) -> String {
    let rows: Vec<String> = offers
        .as_array()
        .map(|list| {
            list.iter()
                .map(|o| {
                    let base = format!(
                        "  [{}] {} {}x {} at ${}/unit with {}",
                        o["short_id"].as_str().unwrap_or("?"),
                        o["offer_type"].as_str().unwrap_or("?"),
                        o["quantity"],
                        o["shape"].as_str().unwrap_or("?"),
                        o["price_per_unit"],
                        o["counterparty"].as_str().unwrap_or("?"),
                    );
                    if received {
                        format!("{base} (respond with its transaction id)")
                    } else {
                        base
                    }
                })
                .collect()
        })
        .unwrap_or_default();
    if rows.is_empty() {
        "(none)".to_owned()
    } else {
        rows.join("\n")
    }
}

fn shapefactory_update(input: &StatusInput) -> String {
    let p = input.private;
    format!(
        "CURRENT STATUS UPDATE (SHAPE FACTORY):\n\
         Time remaining: {} minutes\n\
         Money: ${}\n\
         Specialty shape: {}\n\
         Inventory: {}\n\
         Orders to fulfil: {} ({} completed)\n\
         Production used: {}/{}\n\
         Production status: {}\n\n\
         PENDING OFFERS YOU SENT:\n{}\n\n\
         PENDING OFFERS YOU RECEIVED:\n{}\n\n\
         RECENT COMPLETED TRADES:\n{}\n\n\
         UNREAD MESSAGES:\n{}\n\n\
         OTHER PARTICIPANTS:\n{}\n\n\
         RECENT FAILED ACTIONS:\n{}",
        minutes(input.time_remaining),
        p["money"],
        p["specialty_shape"].as_str().unwrap_or("?"),
        join_strings(&p["inventory"]),
        join_strings(&p["orders"]),
        p["orders_completed"],
        p["specialty_production_used"],
        input.public["experiment_config"]["maxProductionNum"],
        production_section(p),
        offers_section(&p["pending_offers_sent"], false),
        offers_section(&p["pending_offers_received"], true),
        offers_section(&p["recent_trades"], false),
        unread_section(input.unread),
        participants_section(input.public),
        input.failures,
    )
}

fn daytrader_update(input: &StatusInput) -> String {
    let history = input.private["investment_history"]
        .as_array()
        .map(|list| {
            if list.is_empty() {
                "(none)".to_owned()
            } else {
                list.iter()
                    .map(|i| {
                        format!(
                            "  ${} ({})",
                            i["price"],
                            i["decision_type"].as_str().unwrap_or("individual")
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        })
        .unwrap_or_else(|| "(none)".to_owned());
    format!(
        "CURRENT STATUS UPDATE (DAYTRADER):\n\
         Time remaining: {} minutes\n\
         Money: ${}\n\
         Allowed price range: {}-{}\n\
         Your investments so far:\n{}\n\n\
         UNREAD MESSAGES:\n{}\n\n\
         RECENT FAILED ACTIONS:\n{}",
        minutes(input.time_remaining),
        input.private["money"],
        input.private["min_trade_price"],
        input.private["max_trade_price"],
        history,
        unread_section(input.unread),
        input.failures,
    )
}

fn essayranking_update(input: &StatusInput) -> String {
    let essays = input.private["assigned_essays"]
        .as_array()
        .map(|list| {
            list.iter()
                .map(|e| {
                    format!(
                        "  {}: {}",
                        e["essay_id"].as_str().unwrap_or("?"),
                        e["title"].as_str().unwrap_or("?")
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();
    let rankings = input.private["current_rankings"]
        .as_array()
        .map(|list| {
            if list.is_empty() {
                "(none yet)".to_owned()
            } else {
                list.iter()
                    .map(|r| {
                        format!(
                            "  rank {}: {}",
                            r["rank"],
                            r["essay_id"].as_str().unwrap_or("?")
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        })
        .unwrap_or_else(|| "(none yet)".to_owned());
    format!(
        "CURRENT STATUS UPDATE (ESSAY RANKING):\n\
         Time remaining: {} minutes\n\
         Assigned essays:\n{}\n\
         Your current ranking:\n{}\n\n\
         UNREAD MESSAGES:\n{}\n\n\
         RECENT FAILED ACTIONS:\n{}",
        minutes(input.time_remaining),
        essays,
        rankings,
        unread_section(input.unread),
        input.failures,
    )
}

fn wordguessing_update(input: &StatusInput) -> String {
    let p = input.private;
    let role_block = if p["assigned_words"].as_array().map(|w| !w.is_empty()).unwrap_or(false) {
        format!(
            "Role: hinter\nYour secret words: {}\nCurrent round: {}",
            join_strings(&p["assigned_words"]),
            p["current_round"]
        )
    } else {
        format!(
            "Role: guesser\nHinter: {}\nCurrent round: {}\nScore: {}",
            p["hinter_participant"].as_str().unwrap_or("?"),
            p["current_round"],
            p["score"]
        )
    };
    format!(
        "CURRENT STATUS UPDATE (WORDGUESSING):\n\
         Time remaining: {} minutes\n\
         {}\n\n\
         UNREAD MESSAGES:\n{}\n\n\
         RECENT FAILED ACTIONS:\n{}",
        minutes(input.time_remaining),
        role_block,
        unread_section(input.unread),
        input.failures,
    )
}

fn hiddenprofiles_update(input: &StatusInput) -> String {
    let p = input.private;
    let vote_line = match p["my_vote"].as_str() {
        Some(candidate) => format!("You have voted for: {candidate}"),
        None => "You have not voted yet.".to_owned(),
    };
    let vote_prompt = if input.final_vote_due {
        "\n\nTHE EXPERIMENT IS ENDING. Submit your FINAL vote now with submit_vote; \
         you may keep or change your earlier choice."
    } else if !input.has_voted {
        "\n\nYou have finished reading. Cast an initial vote with submit_vote; you can \
         change it later as the discussion evolves."
    } else {
        ""
    };
    format!(
        "CURRENT STATUS UPDATE (HIDDEN PROFILES):\n\
         Time remaining: {} minutes\n\
         Candidates: {}\n\
         {}\n\n\
         UNREAD MESSAGES:\n{}\n\n\
         RECENT FAILED ACTIONS:\n{}{}",
        minutes(input.time_remaining),
        join_strings(&p["candidate_list"]),
        vote_line,
        unread_section(input.unread),
        input.failures,
        vote_prompt,
    )
}

/// Build the kind-specific status update text.
pub fn build_status_update(input: &StatusInput) -> String {
    match input.experiment_type {
        ExperimentType::ShapeFactory => shapefactory_update(input),
        ExperimentType::DayTrader => daytrader_update(input),
        ExperimentType::EssayRanking => essayranking_update(input),
        ExperimentType::WordGuessing => wordguessing_update(input),
        ExperimentType::HiddenProfiles => hiddenprofiles_update(input),
        ExperimentType::Custom(_) => custom_update(input),
    }
}

fn custom_update(input: &StatusInput) -> String {
    let p = input.private;
    let attributes = p["attributes"]
        .as_object()
        .filter(|map| !map.is_empty())
        .map(|map| {
            map.iter()
                .map(|(key, value)| format!("  {key}: {value}"))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_else(|| "(none)".to_owned());
    let variables = p["variables"]
        .as_object()
        .filter(|map| !map.is_empty())
        .map(|map| {
            map.iter()
                .map(|(key, value)| format!("  {key}: {value}"))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_else(|| "(none)".to_owned());
    let actions = p["actions"]
        .as_array()
        .filter(|list| !list.is_empty())
        .map(|list| {
            list.iter()
                .map(|a| {
                    let inputs: Vec<&str> = a["inputs"]
                        .as_array()
                        .map(|names| names.iter().filter_map(Value::as_str).collect())
                        .unwrap_or_default();
                    format!(
                        "  {}({}) - {}",
                        a["name"].as_str().unwrap_or("?"),
                        inputs.join(", "),
                        a["description"].as_str().unwrap_or(""),
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_else(|| "(none)".to_owned());
    format!(
        "CURRENT STATUS UPDATE ({}):\n\
         Time remaining: {} minutes\n\
         Your attributes:\n{}\n\
         Shared variables:\n{}\n\
         Available actions:\n{}\n\n\
         UNREAD MESSAGES:\n{}\n\n\
         RECENT FAILED ACTIONS:\n{}",
        p["experiment_name"].as_str().unwrap_or("CUSTOM").to_uppercase(),
        minutes(input.time_remaining),
        attributes,
        variables,
        actions,
        unread_section(input.unread),
        input.failures,
    )
}
