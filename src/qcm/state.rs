//! Conversational parameter collection for QCM generation.
//!
//! The conversation state is a pure function of the caller-supplied message
//! history: no in-process session map, no affinity. Each user turn advances
//! a small state machine (topic, difficulty, count, confirmation); malformed
//! input re-prompts in place, a refusal at the confirmation step starts
//! over.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::llm::ChatMessage;

pub const MAX_QUESTIONS: u8 = 50;

const AFFIRMATIVES: &[&str] = &[
    "oui", "ouais", "yes", "yep", "ok", "okay", "go", "d'accord", "daccord", "parfait",
    "c'est bon", "cest bon", "lance", "lancer", "génère", "genere", "confirme", "valide",
];

const NEGATIVES: &[&str] = &[
    "non", "no", "nope", "annule", "annuler", "cancel", "recommence", "recommencer", "restart",
    "change", "modifie",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    pub fn label_fr(&self) -> &'static str {
        match self {
            Difficulty::Easy => "Facile",
            Difficulty::Medium => "Moyen",
            Difficulty::Hard => "Difficile",
        }
    }

    /// Locale-tolerant parse: accepts French and English labels anywhere in
    /// the user's wording.
    pub fn parse(text: &str) -> Option<Self> {
        let lowered = text.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| lowered.contains(w));
        if has(&["facile", "simple", "easy"]) {
            Some(Difficulty::Easy)
        } else if has(&["moyen", "moyenne", "medium", "intermédiaire"]) {
            Some(Difficulty::Medium)
        } else if has(&["difficile", "dur", "hard", "avancé"]) {
            Some(Difficulty::Hard)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AskTopic,
    AskDifficulty,
    AskCount,
    Confirm,
    Running,
}

#[derive(Debug, Clone)]
pub struct QcmConversation {
    pub phase: Phase,
    pub topic: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub count: Option<u8>,
}

impl Default for QcmConversation {
    fn default() -> Self {
        Self {
            phase: Phase::AskTopic,
            topic: None,
            difficulty: None,
            count: None,
        }
    }
}

fn first_integer(text: &str) -> Option<u64> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"\d+").unwrap());
    pattern.find(text).and_then(|m| m.as_str().parse().ok())
}

fn normalized(text: &str) -> String {
    text.trim()
        .trim_end_matches(['!', '.', '?'])
        .trim()
        .to_lowercase()
}

fn is_affirmative(text: &str) -> bool {
    let norm = normalized(text);
    AFFIRMATIVES
        .iter()
        .any(|a| norm == *a || norm.starts_with(&format!("{a} ")))
}

fn is_negative(text: &str) -> bool {
    let norm = normalized(text);
    NEGATIVES
        .iter()
        .any(|n| norm == *n || norm.starts_with(&format!("{n} ")))
}

impl QcmConversation {
    /// Rebuild the conversation state by replaying the full message history.
    pub fn replay(messages: &[ChatMessage]) -> Self {
        let mut state = Self::default();
        for message in messages.iter().filter(|m| m.role == "user") {
            state.apply(&message.content);
        }
        state
    }

    fn apply(&mut self, user_text: &str) {
        let text = user_text.trim();
        match self.phase {
            Phase::AskTopic => {
                if !text.is_empty() {
                    self.topic = Some(text.to_string());
                    self.phase = Phase::AskDifficulty;
                }
            }
            Phase::AskDifficulty => {
                if let Some(difficulty) = Difficulty::parse(text) {
                    self.difficulty = Some(difficulty);
                    self.phase = Phase::AskCount;
                }
            }
            Phase::AskCount => {
                if let Some(n) = first_integer(text) {
                    if (1..=MAX_QUESTIONS as u64).contains(&n) {
                        self.count = Some(n as u8);
                        self.phase = Phase::Confirm;
                    }
                }
            }
            Phase::Confirm => {
                if is_affirmative(text) {
                    self.phase = Phase::Running;
                } else if is_negative(text) {
                    *self = Self::default();
                }
            }
            Phase::Running => {}
        }
    }

    /// The assistant's reply for the current phase; `None` once generation
    /// should start.
    pub fn prompt(&self) -> Option<String> {
        match self.phase {
            Phase::AskTopic => Some(
                "Bienvenue dans le générateur de QCM!\n\n\
                 Pour créer vos questions, j'ai besoin de:\n\
                 - **Le sujet** des questions\n\
                 - **La difficulté** (facile, moyen, difficile)\n\
                 - **Le nombre** de questions\n\n\
                 Commençons: quel est le sujet de vos questions?"
                    .to_string(),
            ),
            Phase::AskDifficulty => Some(format!(
                "Bien noté! Sujet: {}\n\n\
                 Quelle difficulté souhaitez-vous? (**facile**, **moyen**, **difficile**)",
                self.topic.as_deref().unwrap_or_default()
            )),
            Phase::AskCount => Some(format!(
                "Très bien, difficulté {}.\n\n\
                 Combien de questions? (entre 1 et {MAX_QUESTIONS})",
                self.difficulty.map(|d| d.label_fr()).unwrap_or_default()
            )),
            Phase::Confirm => Some(format!(
                "**Configuration du QCM:**\n\
                 - **Sujet:** {}\n\
                 - **Difficulté:** {}\n\
                 - **Nombre de questions:** {}\n\n\
                 Est-ce correct? Répondez **oui** pour confirmer ou **non** pour recommencer.",
                self.topic.as_deref().unwrap_or_default(),
                self.difficulty.map(|d| d.label_fr()).unwrap_or_default(),
                self.count.unwrap_or_default(),
            )),
            Phase::Running => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(content: &str) -> ChatMessage {
        ChatMessage {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }

    fn assistant(content: &str) -> ChatMessage {
        ChatMessage {
            role: "assistant".to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn empty_history_asks_for_topic() {
        let state = QcmConversation::replay(&[]);
        assert_eq!(state.phase, Phase::AskTopic);
        assert!(state.prompt().unwrap().contains("sujet"));
    }

    #[test]
    fn full_happy_path_reaches_running() {
        let history = vec![
            user("Python"),
            assistant("difficulté?"),
            user("moyen"),
            assistant("combien?"),
            user("2"),
            assistant("confirmez?"),
            user("oui"),
        ];
        let state = QcmConversation::replay(&history);
        assert_eq!(state.phase, Phase::Running);
        assert_eq!(state.topic.as_deref(), Some("Python"));
        assert_eq!(state.difficulty, Some(Difficulty::Medium));
        assert_eq!(state.count, Some(2));
        assert!(state.prompt().is_none());
    }

    #[test]
    fn malformed_difficulty_stays_in_place() {
        let state = QcmConversation::replay(&[user("Python"), user("aucune idée")]);
        assert_eq!(state.phase, Phase::AskDifficulty);
        assert!(state.difficulty.is_none());
    }

    #[test]
    fn count_out_of_bounds_reprompts() {
        let state = QcmConversation::replay(&[user("Python"), user("facile"), user("70")]);
        assert_eq!(state.phase, Phase::AskCount);
        assert!(state.count.is_none());

        let state = QcmConversation::replay(&[user("Python"), user("facile"), user("0")]);
        assert_eq!(state.phase, Phase::AskCount);
    }

    #[test]
    fn count_accepts_number_inside_sentence() {
        let state =
            QcmConversation::replay(&[user("Python"), user("facile"), user("disons 10 questions")]);
        assert_eq!(state.phase, Phase::Confirm);
        assert_eq!(state.count, Some(10));
    }

    #[test]
    fn negative_at_confirm_resets_everything() {
        let state = QcmConversation::replay(&[
            user("Python"),
            user("facile"),
            user("5"),
            user("non"),
        ]);
        assert_eq!(state.phase, Phase::AskTopic);
        assert!(state.topic.is_none());
        assert!(state.difficulty.is_none());
        assert!(state.count.is_none());
    }

    #[test]
    fn hesitation_at_confirm_reprompts() {
        let state = QcmConversation::replay(&[
            user("Python"),
            user("facile"),
            user("5"),
            user("hmm je réfléchis"),
        ]);
        assert_eq!(state.phase, Phase::Confirm);
    }

    #[test]
    fn affirmatives_are_locale_tolerant() {
        for word in ["oui", "yes", "ok", "go", "d'accord", "lance", "Oui!"] {
            let state = QcmConversation::replay(&[
                user("Python"),
                user("difficile"),
                user("3"),
                user(word),
            ]);
            assert_eq!(state.phase, Phase::Running, "failed for {word}");
        }
    }

    #[test]
    fn french_difficulty_labels_normalize() {
        assert_eq!(Difficulty::parse("facile"), Some(Difficulty::Easy));
        assert_eq!(Difficulty::parse("plutôt moyenne"), Some(Difficulty::Medium));
        assert_eq!(Difficulty::parse("niveau avancé"), Some(Difficulty::Hard));
        assert_eq!(Difficulty::parse("hard"), Some(Difficulty::Hard));
        assert_eq!(Difficulty::parse("n'importe"), None);
    }

    #[test]
    fn replay_ignores_assistant_messages() {
        let state = QcmConversation::replay(&[
            user("Python"),
            assistant("facile ou moyen ou difficile?"),
        ]);
        assert_eq!(state.phase, Phase::AskDifficulty);
    }

    #[test]
    fn confirmation_prompt_recaps_parameters() {
        let state = QcmConversation::replay(&[user("Python"), user("moyen"), user("2")]);
        let prompt = state.prompt().unwrap();
        assert!(prompt.contains("Python"));
        assert!(prompt.contains("Moyen"));
        assert!(prompt.contains('2'));
    }
}
