//! Demo data for running without a remote backend

use chrono::Utc;
use rand::Rng;
use serde_json::json;

use super::models::{Fields, Record};

/// (name, club, country, position)
const NOMINEES: [(&str, &str, &str, &str); 30] = [
    ("Ousmane Dembélé", "Paris Saint-Germain", "France", "FW"),
    ("Lamine Yamal", "FC Barcelona", "Spain", "FW"),
    ("Vitinha", "Paris Saint-Germain", "Portugal", "MF"),
    ("Mohamed Salah", "Liverpool", "Egypt", "FW"),
    ("Raphinha", "FC Barcelona", "Brazil", "FW"),
    ("Achraf Hakimi", "Paris Saint-Germain", "Morocco", "DF"),
    ("Kylian Mbappé", "Real Madrid", "France", "FW"),
    ("Cole Palmer", "Chelsea", "England", "MF"),
    ("Gianluigi Donnarumma", "Manchester City", "Italy", "GK"),
    ("Nuno Mendes", "Paris Saint-Germain", "Portugal", "DF"),
    ("Pedri", "FC Barcelona", "Spain", "MF"),
    ("Khvicha Kvaratskhelia", "Paris Saint-Germain", "Georgia", "FW"),
    ("Harry Kane", "Bayern Munich", "England", "FW"),
    ("Désiré Doué", "Paris Saint-Germain", "France", "FW"),
    ("Viktor Gyökeres", "Arsenal", "Sweden", "FW"),
    ("Vinícius Júnior", "Real Madrid", "Brazil", "FW"),
    ("Michael Olise", "Bayern Munich", "France", "FW"),
    ("Florian Wirtz", "Liverpool", "Germany", "MF"),
    ("Alexis Mac Allister", "Liverpool", "Argentina", "MF"),
    ("Fabián Ruiz", "Paris Saint-Germain", "Spain", "MF"),
    ("Scott McTominay", "Napoli", "Scotland", "MF"),
    ("Robert Lewandowski", "FC Barcelona", "Poland", "FW"),
    ("Erling Haaland", "Manchester City", "Norway", "FW"),
    ("Jude Bellingham", "Real Madrid", "England", "MF"),
    ("Virgil van Dijk", "Liverpool", "Netherlands", "DF"),
    ("João Neves", "Paris Saint-Germain", "Portugal", "MF"),
    ("Lautaro Martínez", "Inter", "Argentina", "FW"),
    ("Denzel Dumfries", "Inter", "Netherlands", "DF"),
    ("Serhou Guirassy", "Borussia Dortmund", "Guinea", "FW"),
    ("Declan Rice", "Arsenal", "England", "MF"),
];

pub const DEMO_VOTES_MIN: i64 = 1_000;
pub const DEMO_VOTES_MAX: i64 = 11_000;

/// 30 demo players with ids `demo-1..demo-30` and random vote counts
/// in `[DEMO_VOTES_MIN, DEMO_VOTES_MAX)`
pub fn demo_players() -> Vec<Record> {
    let mut rng = rand::thread_rng();
    let now = Utc::now();

    NOMINEES
        .iter()
        .enumerate()
        .map(|(index, (name, club, country, position))| {
            let mut fields = Fields::new();
            fields.insert("name".to_string(), json!(name));
            fields.insert("club".to_string(), json!(club));
            fields.insert("country".to_string(), json!(country));
            fields.insert("position".to_string(), json!(position));
            fields.insert(
                "votes".to_string(),
                json!(rng.gen_range(DEMO_VOTES_MIN..DEMO_VOTES_MAX)),
            );

            Record {
                id: format!("demo-{}", index + 1),
                created_at: now,
                updated_at: now,
                fields,
            }
        })
        .collect()
}
