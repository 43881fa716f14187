//! Roster and plan seeding. The roster is fixed: one CEO plus four
//! workers. Task seeds come from a base template set plus keyword-matched
//! extras — content is data, the engine only enforces the 4..=20 batch
//! contract.

use chrono::{DateTime, Utc};

use crate::domain::{Persona, PersonaRole, Task, TaskPriority, TaskStatus};

pub struct TaskSeed {
    pub template_id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub priority: TaskPriority,
}

const BASE_TEMPLATES: &[TaskSeed] = &[
    TaskSeed {
        template_id: "scope-goal",
        title: "Scope the goal into a delivery plan",
        description: "Break the submitted goal into concrete milestones with owners",
        priority: TaskPriority::P0,
    },
    TaskSeed {
        template_id: "build-core",
        title: "Build the core deliverable",
        description: "Implement the primary artifact the goal asks for",
        priority: TaskPriority::P0,
    },
    TaskSeed {
        template_id: "test-pass",
        title: "Run an acceptance test pass",
        description: "Exercise the deliverable end to end and record findings",
        priority: TaskPriority::P1,
    },
    TaskSeed {
        template_id: "package-artifact",
        title: "Package a verifiable artifact",
        description: "Produce the artifact file whose hash proves the work",
        priority: TaskPriority::P1,
    },
    TaskSeed {
        template_id: "write-summary",
        title: "Write the delivery summary",
        description: "Summarize outcomes and open risks for the investor",
        priority: TaskPriority::P2,
    },
];

struct KeywordRule {
    keyword: &'static str,
    templates: &'static [TaskSeed],
}

const KEYWORD_RULES: &[KeywordRule] = &[
    KeywordRule {
        keyword: "web",
        templates: &[TaskSeed {
            template_id: "web-shell",
            title: "Stand up the web shell",
            description: "Scaffold the page layout and wire static assets",
            priority: TaskPriority::P1,
        }],
    },
    KeywordRule {
        keyword: "api",
        templates: &[TaskSeed {
            template_id: "api-contract",
            title: "Define the API contract",
            description: "Write the endpoint contract and error envelope",
            priority: TaskPriority::P1,
        }],
    },
    KeywordRule {
        keyword: "game",
        templates: &[
            TaskSeed {
                template_id: "game-loop",
                title: "Implement the game loop",
                description: "Input handling, tick update and render cycle",
                priority: TaskPriority::P1,
            },
            TaskSeed {
                template_id: "game-score",
                title: "Add scoring and end state",
                description: "Track score and detect the terminal condition",
                priority: TaskPriority::P2,
            },
        ],
    },
    KeywordRule {
        keyword: "docs",
        templates: &[TaskSeed {
            template_id: "docs-guide",
            title: "Write the usage guide",
            description: "Document setup and the happy-path walkthrough",
            priority: TaskPriority::P2,
        }],
    },
    KeywordRule {
        keyword: "data",
        templates: &[TaskSeed {
            template_id: "data-pipeline",
            title: "Assemble the data pipeline",
            description: "Ingest, clean and stage the source data",
            priority: TaskPriority::P1,
        }],
    },
];

pub fn build_personas() -> Vec<Persona> {
    vec![
        Persona {
            id: "ceo-001".to_string(),
            role: PersonaRole::Ceo,
            specialty: "Strategy and prioritization".to_string(),
            objective: "Convert investor goals into executable plans and prove outcomes"
                .to_string(),
        },
        Persona {
            id: "cto-001".to_string(),
            role: PersonaRole::Cto,
            specialty: "Architecture and technical risk".to_string(),
            objective: "Own technical execution quality and delivery velocity".to_string(),
        },
        Persona {
            id: "pm-001".to_string(),
            role: PersonaRole::Pm,
            specialty: "Product scoping and sequencing".to_string(),
            objective: "Maintain backlog clarity and investor-aligned priorities".to_string(),
        },
        Persona {
            id: "eng-001".to_string(),
            role: PersonaRole::Eng,
            specialty: "Implementation and testing".to_string(),
            objective: "Ship deterministic code and validated artifacts".to_string(),
        },
        Persona {
            id: "ops-001".to_string(),
            role: PersonaRole::Ops,
            specialty: "Delivery operations and publishing".to_string(),
            objective: "Keep the office snapshot and artifact trail visible".to_string(),
        },
    ]
}

pub fn worker_persona_ids() -> [&'static str; 4] {
    ["cto-001", "pm-001", "eng-001", "ops-001"]
}

/// Base templates plus any keyword-matched extras, deduplicated by
/// template id in declaration order.
pub fn plan_seeds(goal: &str) -> Vec<&'static TaskSeed> {
    let mut seeds: Vec<&'static TaskSeed> = Vec::new();
    let mut seen = std::collections::HashSet::new();

    let mut push = |seed: &'static TaskSeed, seen: &mut std::collections::HashSet<&'static str>| {
        if seen.insert(seed.template_id) {
            seeds.push(seed);
        }
    };

    for seed in BASE_TEMPLATES {
        push(seed, &mut seen);
    }

    let goal_lower = goal.to_lowercase();
    for rule in KEYWORD_RULES {
        if goal_lower.contains(rule.keyword) {
            for seed in rule.templates {
                push(seed, &mut seen);
            }
        }
    }

    seeds
}

/// Materialize seeds into tasks, round-robin assigned across the four
/// worker personas.
pub fn tasks_from_seeds(seeds: &[&'static TaskSeed], now: DateTime<Utc>) -> Vec<Task> {
    let workers = worker_persona_ids();
    seeds
        .iter()
        .enumerate()
        .map(|(index, seed)| Task {
            task_id: format!("TASK-{:03}", index + 1),
            title: seed.title.to_string(),
            description: seed.description.to_string(),
            status: TaskStatus::Ready,
            priority: seed.priority,
            owner_persona_id: workers[index % workers.len()].to_string(),
            proof_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roster_shape() {
        let personas = build_personas();
        assert_eq!(personas.len(), 5);
        let ceos = personas
            .iter()
            .filter(|p| p.role == PersonaRole::Ceo)
            .count();
        assert_eq!(ceos, 1);
    }

    #[test]
    fn test_base_plan_without_keywords() {
        let seeds = plan_seeds("Deliver something quietly remarkable");
        assert_eq!(seeds.len(), BASE_TEMPLATES.len());
    }

    #[test]
    fn test_keyword_rules_add_templates() {
        let seeds = plan_seeds("Build web snake game with keyboard controls and score");
        let ids: Vec<_> = seeds.iter().map(|s| s.template_id).collect();
        assert!(ids.contains(&"web-shell"));
        assert!(ids.contains(&"game-loop"));
        assert!(ids.contains(&"game-score"));
        assert!(seeds.len() >= 4 && seeds.len() <= 20);
    }

    #[test]
    fn test_tasks_round_robin_owners() {
        let seeds = plan_seeds("Build web docs for the data api");
        let tasks = tasks_from_seeds(&seeds, Utc::now());
        assert_eq!(tasks[0].owner_persona_id, "cto-001");
        assert_eq!(tasks[1].owner_persona_id, "pm-001");
        assert_eq!(tasks[4].owner_persona_id, "cto-001");
        assert_eq!(tasks[0].task_id, "TASK-001");
        assert!(tasks.iter().all(|t| t.status == TaskStatus::Ready));
    }
}
