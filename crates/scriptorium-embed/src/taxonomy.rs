/// A tag in the fixed keyword taxonomy: a facet the tagger treats as its own
/// independently-ranked competition, a display name, and free-text context
/// the name is embedded from.
pub struct TaxonomyTerm {
    pub facet: Facet,
    pub name: &'static str,
    pub context: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Facet {
    Seniority,
    SoftSkill,
    HardSkill,
    Methodology,
    Role,
    Domain,
    Technology,
}

impl Facet {
    /// `(top_k, min_similarity)` per facet, mirroring the upstream keyword
    /// tagger's per-facet QUALIFY thresholds.
    pub const fn rule(self) -> (usize, f32) {
        match self {
            Facet::Seniority => (1, 0.40),
            Facet::SoftSkill => (2, 0.40),
            Facet::HardSkill => (2, 0.35),
            Facet::Methodology => (2, 0.40),
            Facet::Role => (1, 0.40),
            Facet::Domain => (2, 0.40),
            Facet::Technology => (3, 0.70),
        }
    }
}

macro_rules! term {
    ($facet:ident, $name:expr, $context:expr) => {
        TaxonomyTerm {
            facet: Facet::$facet,
            name: $name,
            context: $context,
        }
    };
}

/// A small, fixed keyword taxonomy standing in for the full downloaded
/// vocabulary the upstream tagger fetches at setup time. Covers the facets
/// a prompt-template registry's roles and skills actually need to be tagged
/// against; extend by adding terms, not by changing the matching algorithm.
pub fn terms() -> &'static [TaxonomyTerm] {
    &[
        term!(Seniority, "junior", "entry level, junior, beginner"),
        term!(Seniority, "senior", "senior, experienced, lead level"),
        term!(Seniority, "staff", "staff level, principal, distinguished engineer"),
        term!(SoftSkill, "communication", "clear communication, writing, explaining"),
        term!(SoftSkill, "collaboration", "teamwork, pairing, collaborating with others"),
        term!(SoftSkill, "mentorship", "mentoring, coaching, teaching junior engineers"),
        term!(SoftSkill, "critical-thinking", "critical thinking, reasoning, analysis"),
        term!(HardSkill, "debugging", "debugging, troubleshooting, root cause analysis"),
        term!(HardSkill, "testing", "writing tests, test coverage, quality assurance"),
        term!(HardSkill, "refactoring", "refactoring, code cleanup, restructuring"),
        term!(HardSkill, "performance-tuning", "performance tuning, profiling, optimization"),
        term!(HardSkill, "security-review", "security review, threat modeling, vulnerabilities"),
        term!(Methodology, "agile", "agile, scrum, sprints, standups"),
        term!(Methodology, "test-driven-development", "test driven development, tdd, red green refactor"),
        term!(Methodology, "code-review", "code review, pull request review, review process"),
        term!(Methodology, "incident-response", "incident response, on call, postmortem"),
        term!(Role, "backend-engineer", "backend engineer, server side development, apis"),
        term!(Role, "frontend-engineer", "frontend engineer, user interface, web client"),
        term!(Role, "data-engineer", "data engineer, pipelines, etl, warehousing"),
        term!(Role, "site-reliability-engineer", "site reliability engineer, sre, infrastructure"),
        term!(Role, "technical-writer", "technical writer, documentation, authoring guides"),
        term!(Domain, "web-development", "web development, http, browsers, frontend frameworks"),
        term!(Domain, "data-engineering", "data engineering, pipelines, batch processing"),
        term!(Domain, "machine-learning", "machine learning, model training, inference"),
        term!(Domain, "devops", "devops, deployment, ci cd, infrastructure as code"),
        term!(Domain, "security", "application security, authentication, encryption"),
        term!(Technology, "rust", "rust programming language, cargo, ownership and borrowing"),
        term!(Technology, "python", "python programming language, pip, virtual environments"),
        term!(Technology, "typescript", "typescript, javascript, node, npm"),
        term!(Technology, "docker", "docker, containers, images, compose"),
        term!(Technology, "kubernetes", "kubernetes, k8s, pods, deployments"),
        term!(Technology, "postgresql", "postgresql, sql, relational database"),
        term!(Technology, "aws", "amazon web services, aws, cloud infrastructure"),
    ]
}
