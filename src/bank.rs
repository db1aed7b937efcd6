//! Question bank and session planner
//!
//! The bank is immutable once built and shared read-only between sessions.
//! The planner turns it into a shuffled baseline queue and, after the
//! mid-session analysis, a targeted follow-up queue.

use crate::classifier::MidSessionAnalysis;
use crate::config::SessionLimits;
use crate::error::ScreenError;
use crate::types::{Domain, Question, QuestionKind, QuestionPhase};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use tracing::debug;

static STANDARD_BANK: LazyLock<Arc<QuestionBank>> = LazyLock::new(|| Arc::new(standard_bank()));

/// Bank entry before it is materialized into a session question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankItem {
    pub id: String,
    #[serde(default = "default_difficulty")]
    pub difficulty: u8,
    pub prompt: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct: Option<String>,
    pub kind: QuestionKind,
}

fn default_difficulty() -> u8 {
    1
}

/// Baseline items and follow-up pool of one domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainPool {
    pub domain: Domain,
    pub baseline: Vec<BankItem>,
    #[serde(default)]
    pub follow_up: Vec<BankItem>,
}

/// Static question bank
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionBank {
    pub domains: Vec<DomainPool>,
}

impl QuestionBank {
    /// Built-in bank shared by every session
    pub fn standard() -> Arc<QuestionBank> {
        Arc::clone(&STANDARD_BANK)
    }

    /// Load and validate a custom bank
    pub fn from_json(json: &str) -> Result<Self, ScreenError> {
        let bank: QuestionBank = serde_json::from_str(json)
            .map_err(|e| ScreenError::InvalidBank(format!("Failed to parse bank: {}", e)))?;
        bank.validate()?;
        Ok(bank)
    }

    pub fn to_json(&self) -> Result<String, ScreenError> {
        serde_json::to_string_pretty(self).map_err(ScreenError::JsonError)
    }

    /// Check id uniqueness and per-item consistency
    pub fn validate(&self) -> Result<(), ScreenError> {
        let mut domains = HashSet::new();
        let mut ids = HashSet::new();
        let mut verbal_baseline = 0;

        for pool in &self.domains {
            if !domains.insert(pool.domain) {
                return Err(ScreenError::InvalidBank(format!(
                    "domain {} appears more than once",
                    pool.domain
                )));
            }
            for item in pool.baseline.iter().chain(&pool.follow_up) {
                if !ids.insert(item.id.as_str()) {
                    return Err(ScreenError::InvalidBank(format!(
                        "duplicate question id {}",
                        item.id
                    )));
                }
                validate_item(item)?;
            }
            verbal_baseline += pool.baseline.iter().filter(|i| i.kind.is_verbal()).count();
        }

        if verbal_baseline > 1 {
            return Err(ScreenError::InvalidBank(format!(
                "at most one verbal baseline item is allowed, found {}",
                verbal_baseline
            )));
        }
        if self.baseline_len() == 0 {
            return Err(ScreenError::InvalidBank("bank has no baseline items".to_string()));
        }
        Ok(())
    }

    /// Number of baseline items across all domains
    pub fn baseline_len(&self) -> usize {
        self.domains.iter().map(|p| p.baseline.len()).sum()
    }

    pub fn pool(&self, domain: Domain) -> Option<&DomainPool> {
        self.domains.iter().find(|p| p.domain == domain)
    }

    /// Total items in the bank
    pub fn len(&self) -> usize {
        self.domains
            .iter()
            .map(|p| p.baseline.len() + p.follow_up.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn validate_item(item: &BankItem) -> Result<(), ScreenError> {
    if item.kind.is_verbal() {
        if !item.options.is_empty() {
            return Err(ScreenError::InvalidBank(format!(
                "verbal item {} must not have options",
                item.id
            )));
        }
        return Ok(());
    }
    match &item.correct {
        Some(correct) if item.options.contains(correct) => Ok(()),
        Some(correct) => Err(ScreenError::InvalidBank(format!(
            "item {}: correct answer {:?} is not one of its options",
            item.id, correct
        ))),
        None => Err(ScreenError::InvalidBank(format!(
            "item {} has no correct answer",
            item.id
        ))),
    }
}

/// Builds baseline and follow-up queues from a bank
#[derive(Debug, Clone)]
pub struct SessionPlanner {
    bank: Arc<QuestionBank>,
    limits: SessionLimits,
}

impl SessionPlanner {
    pub fn new(bank: Arc<QuestionBank>, limits: SessionLimits) -> Result<Self, ScreenError> {
        if bank.baseline_len() < limits.baseline_question_count {
            return Err(ScreenError::InvalidConfig(format!(
                "bank has {} baseline items but {} are required",
                bank.baseline_len(),
                limits.baseline_question_count
            )));
        }
        Ok(Self { bank, limits })
    }

    pub fn bank(&self) -> &QuestionBank {
        &self.bank
    }

    fn materialize(&self, domain: Domain, item: &BankItem, phase: QuestionPhase) -> Question {
        Question {
            id: item.id.clone(),
            domain,
            difficulty: item.difficulty,
            phase,
            prompt: item.prompt.clone(),
            options: item.options.clone(),
            correct: item.correct.clone(),
            max_attempts: self.limits.max_tries,
            kind: item.kind.clone(),
        }
    }

    /// Shuffled baseline set with the voice check pinned to the second slot
    pub fn generate_baseline<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<Question> {
        let mut verbal = None;
        let mut questions = Vec::new();

        for pool in &self.bank.domains {
            for item in &pool.baseline {
                let question = self.materialize(pool.domain, item, QuestionPhase::Baseline);
                if question.kind.is_verbal() {
                    verbal = Some(question);
                } else {
                    questions.push(question);
                }
            }
        }

        questions.shuffle(rng);
        let count = self.limits.baseline_question_count;
        match verbal {
            Some(verbal) => {
                // The voice check always survives a bank larger than the baseline
                questions.truncate(count.saturating_sub(1));
                let at = questions.len().min(1);
                questions.insert(at, verbal);
            }
            None => questions.truncate(count),
        }
        questions
    }

    /// Follow-up questions for the analysis' focus domains.
    ///
    /// Returns exactly `min(requested, max_followup_questions, budget, pool)`
    /// distinct questions, where pool is the combined follow-up pool size of
    /// the focus domains.
    pub fn generate_follow_up<R: Rng + ?Sized>(
        &self,
        analysis: &MidSessionAnalysis,
        budget: usize,
        rng: &mut R,
    ) -> Vec<Question> {
        let requested = analysis.additional_questions;
        if !analysis.continue_session || requested == 0 || analysis.focus_domains.is_empty() {
            return Vec::new();
        }

        let mut seen = HashSet::new();
        let pools: Vec<&DomainPool> = analysis
            .focus_domains
            .iter()
            .filter(|d| seen.insert(**d))
            .filter_map(|d| self.bank.pool(*d))
            .collect();
        if pools.is_empty() {
            return Vec::new();
        }

        let per_domain = requested.div_ceil(analysis.focus_domains.len());
        let pool_size: usize = pools.iter().map(|p| p.follow_up.len()).sum();
        let target = requested
            .min(self.limits.max_followup_questions)
            .min(budget)
            .min(pool_size);

        let mut selected = Vec::new();
        let mut leftovers = Vec::new();
        for pool in pools {
            let mut items: Vec<&BankItem> = pool.follow_up.iter().collect();
            items.shuffle(rng);
            for (i, item) in items.into_iter().enumerate() {
                let question = self.materialize(pool.domain, item, QuestionPhase::Followup);
                if i < per_domain {
                    selected.push(question);
                } else {
                    leftovers.push(question);
                }
            }
        }

        // Small pools leave a shortfall; top up in focus order
        let shortfall = target.saturating_sub(selected.len());
        selected.extend(leftovers.into_iter().take(shortfall));

        selected.shuffle(rng);
        selected.truncate(target);
        debug!(requested, target, "generated follow-up questions");
        selected
    }
}

// ============================================================================
// Standard bank
// ============================================================================

fn choice(id: &str, prompt: &str, options: &[&str], correct: &str, kind: QuestionKind) -> BankItem {
    BankItem {
        id: id.to_string(),
        difficulty: 1,
        prompt: prompt.to_string(),
        options: options.iter().map(|o| o.to_string()).collect(),
        correct: Some(correct.to_string()),
        kind,
    }
}

fn hard(mut item: BankItem) -> BankItem {
    item.difficulty = 2;
    item
}

fn verbal(id: &str, word: &str) -> BankItem {
    BankItem {
        id: id.to_string(),
        difficulty: 1,
        prompt: "Say this word out loud:".to_string(),
        options: Vec::new(),
        correct: None,
        kind: QuestionKind::Verbal {
            word: word.to_string(),
        },
    }
}

fn letter(id: &str, shown: char) -> BankItem {
    choice(
        id,
        "Which letter is this?",
        &["b", "d", "p", "q"],
        &shown.to_string(),
        QuestionKind::Letter { shown },
    )
}

fn rhyme(id: &str, target: &str, options: &[&str], correct: &str) -> BankItem {
    choice(
        id,
        &format!("Which word rhymes with {}?", target),
        options,
        correct,
        QuestionKind::Rhyme {
            target: target.to_string(),
        },
    )
}

fn starts_like(id: &str, target: &str, options: &[&str], correct: &str) -> BankItem {
    choice(
        id,
        &format!("Which word starts like {}?", target),
        options,
        correct,
        QuestionKind::Sound {
            target: target.to_string(),
        },
    )
}

fn counting(id: &str, noun: &str, count: u32, options: &[&str]) -> BankItem {
    choice(
        id,
        &format!("How many {}?", noun),
        options,
        &count.to_string(),
        QuestionKind::Counting { count },
    )
}

fn arithmetic(id: &str, expression: &str, options: &[&str], correct: &str) -> BankItem {
    choice(
        id,
        &format!("What is {}?", expression),
        options,
        correct,
        QuestionKind::Arithmetic {
            expression: expression.to_string(),
        },
    )
}

fn digit_span(id: &str, sequence: &[u8], options: &[&str]) -> BankItem {
    let correct = sequence
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    choice(
        id,
        "Remember the numbers!",
        options,
        &correct,
        QuestionKind::WorkingMemory {
            sequence: sequence.to_vec(),
        },
    )
}

fn stroop(id: &str, prompt: &str, word: &str, ink: &str, correct: &str) -> BankItem {
    hard(choice(
        id,
        prompt,
        &["Blue", "Red", "Green", "Yellow"],
        correct,
        QuestionKind::Stroop {
            word: word.to_string(),
            ink: ink.to_string(),
        },
    ))
}

fn odd_one_out(id: &str, prompt: &str, correct_index: usize) -> BankItem {
    const ORDINALS: [&str; 4] = ["1st", "2nd", "3rd", "4th"];
    choice(
        id,
        prompt,
        &ORDINALS,
        ORDINALS[correct_index],
        QuestionKind::Matching { correct_index },
    )
}

fn sound_match(id: &str, options: &[&str], correct: &str) -> BankItem {
    choice(
        id,
        "Which word sounds DIFFERENT?",
        options,
        correct,
        QuestionKind::SoundMatch,
    )
}

fn standard_bank() -> QuestionBank {
    QuestionBank {
        domains: vec![
            DomainPool {
                domain: Domain::Reading,
                baseline: vec![
                    letter("base_letter_b", 'b'),
                    rhyme("base_rhyme_cat", "CAT", &["HAT", "DOG", "CUP", "SUN"], "HAT"),
                ],
                follow_up: vec![
                    letter("fu_letter_d", 'd'),
                    letter("fu_letter_p", 'p'),
                    rhyme("fu_rhyme_ball", "BALL", &["TALL", "BOOK", "BIRD", "MILK"], "TALL"),
                    rhyme("fu_rhyme_tree", "TREE", &["BEE", "CAR", "DOG", "TOY"], "BEE"),
                    starts_like("fu_sound_sun", "SUN", &["SOCK", "MOON", "BALL", "CAR"], "SOCK"),
                    starts_like("fu_sound_ball", "BALL", &["BAT", "CAT", "DOG", "FISH"], "BAT"),
                ],
            },
            DomainPool {
                domain: Domain::Math,
                baseline: vec![counting("base_count_4", "stars", 4, &["3", "4", "5", "6"])],
                follow_up: vec![
                    counting("fu_count_5", "hearts", 5, &["4", "5", "6", "7"]),
                    counting("fu_count_6", "circles", 6, &["5", "6", "7", "8"]),
                    arithmetic("fu_add_4_2", "4 + 2", &["5", "6", "7", "8"], "6"),
                    arithmetic("fu_sub_5_2", "5 - 2", &["2", "3", "4", "5"], "3"),
                    arithmetic("base_add_2_3", "2 + 3", &["4", "5", "6", "7"], "5"),
                    choice(
                        "fu_qty_1",
                        "Which group has MORE?",
                        &["🟢🟢🟢🟢🟢 (5)", "🔵🔵🔵 (3)"],
                        "🟢🟢🟢🟢🟢 (5)",
                        QuestionKind::Quantity,
                    ),
                    choice(
                        "fu_seq_1",
                        "What comes next? 2, 4, 6, ?",
                        &["7", "8", "9", "10"],
                        "8",
                        QuestionKind::Pattern,
                    ),
                ],
            },
            DomainPool {
                domain: Domain::Attention,
                baseline: vec![digit_span(
                    "base_mem_3",
                    &[3, 7, 2],
                    &["3, 7, 2", "7, 3, 2", "2, 7, 3", "3, 2, 7"],
                )],
                follow_up: vec![
                    digit_span("fu_mem_4", &[5, 1, 9], &["5, 1, 9", "1, 5, 9", "9, 1, 5", "5, 9, 1"]),
                    hard(digit_span(
                        "fu_mem_5",
                        &[4, 1, 8, 5],
                        &["4, 1, 8, 5", "1, 4, 8, 5", "4, 8, 1, 5", "5, 8, 1, 4"],
                    )),
                    stroop(
                        "fu_stroop_1",
                        "What COLOR is this word? (not what it says!)",
                        "BLUE",
                        "red",
                        "Red",
                    ),
                    stroop("fu_stroop_2", "What COLOR is this word?", "GREEN", "yellow", "Yellow"),
                ],
            },
            DomainPool {
                domain: Domain::Visual,
                baseline: vec![choice(
                    "base_pattern_1",
                    "What comes next? 🔴 🔵 🔴 🔵 ?",
                    &["🔴", "🔵", "🟢", "🟡"],
                    "🔴",
                    QuestionKind::Pattern,
                )],
                follow_up: vec![
                    choice(
                        "fu_pattern_2",
                        "What comes next? ⭐ ⭐ 🌙 ⭐ ⭐ 🌙 ?",
                        &["⭐", "🌙", "☀️", "🌟"],
                        "⭐",
                        QuestionKind::Pattern,
                    ),
                    odd_one_out("fu_match_1", "Which shape is DIFFERENT?", 3),
                    odd_one_out("fu_match_2", "Find the odd one out:", 2),
                ],
            },
            DomainPool {
                domain: Domain::Listening,
                baseline: vec![verbal("base_voice_check", "HELLO 👋")],
                follow_up: vec![
                    sound_match("fu_sound_diff_1", &["CAT", "BAT", "HAT", "BALL"], "BALL"),
                    sound_match("fu_sound_diff_2", &["PEN", "TEN", "HEN", "DOG"], "DOG"),
                    sound_match("fu_sound_diff_3", &["CAKE", "LAKE", "CAR", "MAKE"], "CAR"),
                    verbal("fu_verbal_1", "ELEPHANT 🐘"),
                ],
            },
        ],
    }
}
