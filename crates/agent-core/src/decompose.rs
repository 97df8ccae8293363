//! Goal decomposition into fixed five-step templates.

use serde::{Deserialize, Serialize};

/// Number of steps every template produces.
pub const STEPS_PER_GOAL: usize = 5;

/// Decomposition category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Template {
    Research,
    Analysis,
    Creation,
    Planning,
}

/// Keyword routing, checked in order; first match wins.
const ROUTES: &[(Template, &[&str])] = &[
    (Template::Research, &["research", "analyze", "find"]),
    (Template::Analysis, &["analyze", "compare", "evaluate"]),
    (Template::Planning, &["plan", "strategy", "roadmap"]),
];

impl Template {
    /// Pick the template for a goal.
    ///
    /// Matching is a case-insensitive substring test, so "planet" routes to
    /// planning. Goals with no keyword fall back to [`Template::Creation`].
    #[must_use]
    pub fn select(goal: &str) -> Self {
        let goal = goal.to_lowercase();
        ROUTES
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| goal.contains(k)))
            .map_or(Self::Creation, |(template, _)| *template)
    }

    /// Ordered step titles.
    #[must_use]
    pub const fn steps(self) -> [&'static str; STEPS_PER_GOAL] {
        match self {
            Self::Research => [
                "Research and gather initial information",
                "Identify key sources and references",
                "Analyze and synthesize findings",
                "Create structured summary",
                "Generate comprehensive report",
            ],
            Self::Analysis => [
                "Define analysis framework",
                "Collect relevant data",
                "Perform detailed analysis",
                "Identify patterns and insights",
                "Create actionable recommendations",
            ],
            Self::Creation => [
                "Define requirements and objectives",
                "Create outline/structure",
                "Develop core content",
                "Refine and optimize",
                "Finalize and deliver",
            ],
            Self::Planning => [
                "Assess current situation",
                "Define objectives and KPIs",
                "Develop strategic approach",
                "Create implementation timeline",
                "Define success metrics",
            ],
        }
    }
}

/// Decompose a goal into ordered task titles.
#[must_use]
pub fn decompose(goal: &str) -> [&'static str; STEPS_PER_GOAL] {
    Template::select(goal).steps()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn research_keywords() {
        assert_eq!(Template::select("Research quantum sensors"), Template::Research);
        assert_eq!(Template::select("please ANALYZE churn"), Template::Research);
        assert_eq!(Template::select("find cheap flights"), Template::Research);
    }

    #[test]
    fn analysis_reachable_only_without_research_keywords() {
        assert_eq!(Template::select("Compare two vendors"), Template::Analysis);
        assert_eq!(Template::select("evaluate the design"), Template::Analysis);
        assert_eq!(Template::select("analyze and compare"), Template::Research);
    }

    #[test]
    fn planning_keywords() {
        assert_eq!(Template::select("Plan a launch"), Template::Planning);
        assert_eq!(Template::select("marketing STRATEGY"), Template::Planning);
        assert_eq!(Template::select("product roadmap"), Template::Planning);
    }

    #[test]
    fn first_match_wins_over_planning() {
        assert_eq!(Template::select("research a plan"), Template::Research);
    }

    #[test]
    fn default_is_creation() {
        assert_eq!(Template::select("write a poem"), Template::Creation);
        assert_eq!(Template::select(""), Template::Creation);
    }

    #[test]
    fn every_template_has_five_distinct_steps() {
        for template in [
            Template::Research,
            Template::Analysis,
            Template::Creation,
            Template::Planning,
        ] {
            let steps = template.steps();
            assert_eq!(steps.len(), STEPS_PER_GOAL);
            for (i, step) in steps.iter().enumerate() {
                assert!(!step.is_empty());
                assert!(!steps[i + 1..].contains(step));
            }
        }
    }

    #[test]
    fn decompose_uses_selected_template() {
        assert_eq!(decompose("roadmap for Q3")[0], "Assess current situation");
    }
}
