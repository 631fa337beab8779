//! The closed registry of supported exams.
//!
//! Every place that validates an exam token (serde, path parameters, the
//! SQL `CHECK` constraint, the change-exam operation) goes through this
//! module. There is no runtime path that adds an exam.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::AccessError;

/// Serialized as the upper-case token; deserialized through [`FromStr`],
/// so any casing of a registered token is accepted.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum ExamId {
    Cat,
    Upsc,
    Jee,
    Neet,
    Gate,
    Ssc,
    Ibps,
    Gmat,
    Gre,
    Ielts,
}

impl ExamId {
    pub const ALL: [ExamId; 10] = [
        Self::Cat,
        Self::Upsc,
        Self::Jee,
        Self::Neet,
        Self::Gate,
        Self::Ssc,
        Self::Ibps,
        Self::Gmat,
        Self::Gre,
        Self::Ielts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cat => "CAT",
            Self::Upsc => "UPSC",
            Self::Jee => "JEE",
            Self::Neet => "NEET",
            Self::Gate => "GATE",
            Self::Ssc => "SSC",
            Self::Ibps => "IBPS",
            Self::Gmat => "GMAT",
            Self::Gre => "GRE",
            Self::Ielts => "IELTS",
        }
    }

    pub fn info(&self) -> &'static ExamInfo {
        // ALL and EXAMS share ordering; see registry_order_matches_enum.
        &EXAMS[*self as usize]
    }

    /// SQL fragment listing every valid token, for `CHECK (exam IN (...))`.
    pub fn sql_domain() -> String {
        Self::ALL
            .iter()
            .map(|e| format!("'{}'", e.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for ExamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExamId {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        Self::ALL
            .into_iter()
            .find(|e| e.as_str().eq_ignore_ascii_case(token))
            .ok_or_else(|| AccessError::Validation(format!("unknown exam: {token}")))
    }
}

impl TryFrom<String> for ExamId {
    type Error = AccessError;

    fn try_from(token: String) -> Result<Self, Self::Error> {
        token.parse()
    }
}

/// Membership test against the registry.
pub fn is_valid_exam(token: &str) -> bool {
    token.parse::<ExamId>().is_ok()
}

/// Seed taxonomy for an exam. Only consulted when seeding the store.
pub fn subjects_for(exam: ExamId) -> &'static [SubjectTemplate] {
    exam.info().subjects
}

/// Display metadata for one exam.
#[derive(Debug)]
pub struct ExamInfo {
    pub id: ExamId,
    pub name: &'static str,
    pub full_name: &'static str,
    pub subjects: &'static [SubjectTemplate],
}

#[derive(Debug)]
pub struct SubjectTemplate {
    pub name: &'static str,
    pub topics: &'static [&'static str],
}

macro_rules! subject {
    ($name:expr, [$($topic:expr),* $(,)?]) => {
        SubjectTemplate { name: $name, topics: &[$($topic),*] }
    };
}

pub static EXAMS: [ExamInfo; 10] = [
    ExamInfo {
        id: ExamId::Cat,
        name: "CAT",
        full_name: "Common Admission Test",
        subjects: &[
            subject!("Quantitative Aptitude", ["Arithmetic", "Algebra", "Geometry", "Number Systems", "Modern Math"]),
            subject!("Verbal Ability", ["Reading Comprehension", "Para Jumbles", "Para Summary", "Odd Sentence Out"]),
            subject!("Data Interpretation", ["Tables", "Charts", "Caselets"]),
            subject!("Logical Reasoning", ["Arrangements", "Puzzles", "Games and Tournaments"]),
        ],
    },
    ExamInfo {
        id: ExamId::Upsc,
        name: "UPSC",
        full_name: "Union Public Service Commission Civil Services Examination",
        subjects: &[
            subject!("History", ["Ancient India", "Medieval India", "Modern India", "World History"]),
            subject!("Geography", ["Physical Geography", "Indian Geography", "World Geography"]),
            subject!("Polity", ["Constitution", "Governance", "Judiciary"]),
            subject!("Economy", ["Macroeconomics", "Banking", "Budget and Fiscal Policy"]),
            subject!("Current Affairs", ["National", "International", "Science and Technology"]),
        ],
    },
    ExamInfo {
        id: ExamId::Jee,
        name: "JEE",
        full_name: "Joint Entrance Examination",
        subjects: &[
            subject!("Physics", ["Mechanics", "Thermodynamics", "Electromagnetism", "Optics", "Modern Physics"]),
            subject!("Chemistry", ["Physical Chemistry", "Organic Chemistry", "Inorganic Chemistry"]),
            subject!("Mathematics", ["Calculus", "Algebra", "Coordinate Geometry", "Trigonometry", "Vectors"]),
        ],
    },
    ExamInfo {
        id: ExamId::Neet,
        name: "NEET",
        full_name: "National Eligibility cum Entrance Test",
        subjects: &[
            subject!("Physics", ["Mechanics", "Thermodynamics", "Electrostatics", "Optics"]),
            subject!("Chemistry", ["Physical Chemistry", "Organic Chemistry", "Inorganic Chemistry"]),
            subject!("Biology", ["Botany", "Zoology", "Genetics", "Human Physiology", "Ecology"]),
        ],
    },
    ExamInfo {
        id: ExamId::Gate,
        name: "GATE",
        full_name: "Graduate Aptitude Test in Engineering",
        subjects: &[
            subject!("Engineering Mathematics", ["Linear Algebra", "Calculus", "Probability", "Discrete Mathematics"]),
            subject!("General Aptitude", ["Verbal Aptitude", "Quantitative Aptitude", "Analytical Aptitude"]),
            subject!("Computer Science", ["Algorithms", "Operating Systems", "Databases", "Computer Networks", "Theory of Computation"]),
        ],
    },
    ExamInfo {
        id: ExamId::Ssc,
        name: "SSC",
        full_name: "Staff Selection Commission",
        subjects: &[
            subject!("Quantitative Aptitude", ["Arithmetic", "Algebra", "Geometry"]),
            subject!("General Intelligence", ["Analogies", "Series", "Coding Decoding"]),
            subject!("English Language", ["Grammar", "Vocabulary", "Comprehension"]),
            subject!("General Awareness", ["History", "Geography", "Static GK"]),
        ],
    },
    ExamInfo {
        id: ExamId::Ibps,
        name: "IBPS",
        full_name: "Institute of Banking Personnel Selection",
        subjects: &[
            subject!("Reasoning Ability", ["Puzzles", "Seating Arrangement", "Syllogism"]),
            subject!("Quantitative Aptitude", ["Data Interpretation", "Simplification", "Arithmetic"]),
            subject!("English Language", ["Reading Comprehension", "Cloze Test", "Error Detection"]),
            subject!("Banking Awareness", ["Banking Terms", "RBI and Monetary Policy", "Financial Current Affairs"]),
        ],
    },
    ExamInfo {
        id: ExamId::Gmat,
        name: "GMAT",
        full_name: "Graduate Management Admission Test",
        subjects: &[
            subject!("Quantitative Reasoning", ["Problem Solving", "Arithmetic", "Algebra"]),
            subject!("Verbal Reasoning", ["Critical Reasoning", "Reading Comprehension"]),
            subject!("Data Insights", ["Data Sufficiency", "Multi-Source Reasoning", "Table Analysis"]),
        ],
    },
    ExamInfo {
        id: ExamId::Gre,
        name: "GRE",
        full_name: "Graduate Record Examinations",
        subjects: &[
            subject!("Verbal Reasoning", ["Text Completion", "Sentence Equivalence", "Reading Comprehension"]),
            subject!("Quantitative Reasoning", ["Arithmetic", "Algebra", "Geometry", "Data Analysis"]),
            subject!("Analytical Writing", ["Analyze an Issue"]),
        ],
    },
    ExamInfo {
        id: ExamId::Ielts,
        name: "IELTS",
        full_name: "International English Language Testing System",
        subjects: &[
            subject!("Listening", ["Conversations", "Monologues", "Note Completion"]),
            subject!("Reading", ["Academic Reading", "General Reading", "True False Not Given"]),
            subject!("Writing", ["Task 1", "Task 2"]),
            subject!("Speaking", ["Part 1", "Part 2 Cue Card", "Part 3"]),
        ],
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_ten_exams() {
        assert_eq!(ExamId::ALL.len(), 10);
        assert_eq!(EXAMS.len(), 10);
    }

    #[test]
    fn registry_order_matches_enum() {
        for exam in ExamId::ALL {
            assert_eq!(exam.info().id, exam);
            assert_eq!(exam.info().name, exam.as_str());
        }
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("jee".parse::<ExamId>().unwrap(), ExamId::Jee);
        assert_eq!(" NEET ".parse::<ExamId>().unwrap(), ExamId::Neet);
    }

    #[test]
    fn unknown_token_rejected() {
        assert!(!is_valid_exam("SAT"));
        assert!(!is_valid_exam(""));
        assert!(matches!("SAT".parse::<ExamId>(), Err(AccessError::Validation(_))));
    }

    #[test]
    fn all_tokens_valid() {
        for token in ["CAT", "UPSC", "JEE", "NEET", "GATE", "SSC", "IBPS", "GMAT", "GRE", "IELTS"] {
            assert!(is_valid_exam(token), "{token}");
        }
    }

    #[test]
    fn serde_uses_upper_case_token() {
        let json = serde_json::to_string(&ExamId::Ielts).unwrap();
        assert_eq!(json, r#""IELTS""#);
        let parsed: ExamId = serde_json::from_str(r#""GATE""#).unwrap();
        assert_eq!(parsed, ExamId::Gate);
        let err = serde_json::from_str::<ExamId>(r#""SAT""#).unwrap_err();
        assert!(err.to_string().contains("unknown exam: SAT"));
    }

    #[test]
    fn serde_accepts_any_casing() {
        for raw in [r#""neet""#, r#""Neet""#, r#"" NEET ""#] {
            assert_eq!(serde_json::from_str::<ExamId>(raw).unwrap(), ExamId::Neet, "{raw}");
        }
        #[derive(Deserialize)]
        struct Body {
            exam: ExamId,
        }
        let body: Body = serde_json::from_str(r#"{"exam": "jee"}"#).unwrap();
        assert_eq!(body.exam, ExamId::Jee);
    }

    #[test]
    fn every_exam_has_subjects_with_topics() {
        for exam in ExamId::ALL {
            let subjects = subjects_for(exam);
            assert!(!subjects.is_empty(), "{exam}");
            assert!(subjects.iter().all(|s| !s.topics.is_empty()), "{exam}");
        }
    }

    #[test]
    fn sql_domain_lists_every_token() {
        let domain = ExamId::sql_domain();
        assert!(domain.starts_with("'CAT'"));
        assert!(domain.ends_with("'IELTS'"));
        assert_eq!(domain.matches(',').count(), 9);
    }
}
