//! Deterministic symptom-to-department routing.
//!
//! Routing never depends on the guidance service: the department is decided here by ordered
//! keyword containment and passed to the service only as context.

/// Department returned when no rule matches.
pub const DEFAULT_DEPARTMENT: &str = "General Practitioner";

/// A set of trigger keywords (lower-case) routed to one department.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepartmentRule {
    pub keywords: &'static [&'static str],
    pub department: &'static str,
}

impl DepartmentRule {
    /// First keyword of this rule contained in `normalized`, if any.
    fn first_match(&self, normalized: &str) -> Option<&'static str> {
        self.keywords.iter().copied().find(|k| normalized.contains(k))
    }
}

/// Rules in match-priority order. The first rule with any matching keyword wins.
pub const DEPARTMENT_RULES: &[DepartmentRule] = &[
    DepartmentRule {
        keywords: &[
            "chest pain",
            "heart pain",
            "palpitations",
            "shortness of breath",
            "heart attack",
        ],
        department: "Cardiology",
    },
    DepartmentRule {
        keywords: &["headache", "dizziness", "migraine", "seizure", "stroke", "numbness"],
        department: "Neurology",
    },
    DepartmentRule {
        keywords: &[
            "cough",
            "sore throat",
            "runny nose",
            "asthma",
            "wheezing",
            "congestion",
        ],
        department: "ENT / Pulmonology",
    },
    DepartmentRule {
        keywords: &[
            "stomach pain",
            "nausea",
            "vomiting",
            "diarrhea",
            "constipation",
            "acid reflux",
        ],
        department: "Gastroenterology",
    },
    DepartmentRule {
        keywords: &["fever", "fatigue", "weakness", "body ache", "chills"],
        department: "General Medicine",
    },
];

/// Outcome of classification, with the keyword that selected the department.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepartmentMatch {
    pub department: &'static str,
    /// `None` when the default department was used.
    pub matched_keyword: Option<&'static str>,
}

/// Classify symptoms and report which keyword decided the route.
pub fn explain_department(symptoms: &str) -> DepartmentMatch {
    let normalized = symptoms.to_lowercase();
    DEPARTMENT_RULES
        .iter()
        .find_map(|rule| {
            rule.first_match(&normalized).map(|keyword| DepartmentMatch {
                department: rule.department,
                matched_keyword: Some(keyword),
            })
        })
        .unwrap_or(DepartmentMatch {
            department: DEFAULT_DEPARTMENT,
            matched_keyword: None,
        })
}

/// Map free-text symptoms to a department label. Total and pure.
pub fn classify_department(symptoms: &str) -> &'static str {
    explain_department(symptoms).department
}
