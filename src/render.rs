//! turns a turn's text into plain segments interleaved with recipe links.
//!
//! text is never interpreted as markup; the only thing derived from it is
//! where the links go.

use crate::conversation::Turn;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    /// clickable span; `recipe` indexes the owning turn's recipe list.
    Reference { recipe: usize, text: String },
}

impl Segment {
    pub fn text(&self) -> &str {
        match self {
            Segment::Text(text) | Segment::Reference { text, .. } => text,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderPlan {
    pub segments: Vec<Segment>,
}

impl RenderPlan {
    pub fn plain(content: &str) -> Self {
        if content.is_empty() {
            return Self::default();
        }
        Self { segments: vec![Segment::Text(content.to_string())] }
    }

    /// the visible text, links included.
    pub fn text(&self) -> String {
        self.segments.iter().map(Segment::text).collect()
    }

    pub fn references(&self) -> impl Iterator<Item = (usize, &str)> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Reference { recipe, text } => Some((*recipe, text.as_str())),
            Segment::Text(_) => None,
        })
    }
}

/// link the first occurrence of each recipe title, in recipe order.
///
/// each title is searched in the text as already linked by earlier recipes.
/// when that first occurrence overlaps an existing link it is consumed and the
/// recipe gets no link; later plain repeats are not tried.
pub fn resolve_references(turn: &Turn) -> RenderPlan {
    let mut plan = RenderPlan::plain(&turn.content);
    for (index, recipe) in turn.recipes.iter().enumerate() {
        if recipe.title.is_empty() {
            continue;
        }
        link_first(&mut plan.segments, index, &recipe.title);
    }
    plan
}

fn link_first(segments: &mut Vec<Segment>, recipe: usize, title: &str) {
    let full: String = segments.iter().map(Segment::text).collect();
    let Some(start) = full.find(title) else {
        return;
    };
    let end = start + title.len();

    let mut offset = 0;
    for i in 0..segments.len() {
        let len = segments[i].text().len();
        let (seg_start, seg_end) = (offset, offset + len);
        offset = seg_end;
        if start >= seg_end {
            continue;
        }
        let Segment::Text(text) = &segments[i] else {
            return;
        };
        if end > seg_end {
            return;
        }

        let (before, rest) = text.split_at(start - seg_start);
        let (linked, after) = rest.split_at(title.len());
        let mut replacement = Vec::with_capacity(3);
        if !before.is_empty() {
            replacement.push(Segment::Text(before.to_string()));
        }
        replacement.push(Segment::Reference { recipe, text: linked.to_string() });
        if !after.is_empty() {
            replacement.push(Segment::Text(after.to_string()));
        }
        segments.splice(i..=i, replacement);
        return;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::tests::recipe;
    use pretty_assertions::assert_eq;

    fn turn(content: &str, titles: &[&str]) -> Turn {
        Turn::assistant(content, titles.iter().map(|t| recipe(t)).collect())
    }

    fn text(s: &str) -> Segment {
        Segment::Text(s.to_string())
    }

    fn link(recipe: usize, s: &str) -> Segment {
        Segment::Reference { recipe, text: s.to_string() }
    }

    #[test]
    fn links_only_the_first_occurrence() {
        let plan = resolve_references(&turn(
            "Try the Spicy Tofu Bowl tonight, the Spicy Tofu Bowl is great",
            &["Spicy Tofu Bowl"],
        ));
        assert_eq!(
            plan.segments,
            vec![
                text("Try the "),
                link(0, "Spicy Tofu Bowl"),
                text(" tonight, the Spicy Tofu Bowl is great"),
            ]
        );
        assert_eq!(plan.references().count(), 1);
    }

    #[test]
    fn user_turns_and_turns_without_recipes_stay_plain() {
        let plan = resolve_references(&Turn::user("Spicy Tofu Bowl"));
        assert_eq!(plan.segments, vec![text("Spicy Tofu Bowl")]);
        let plan = resolve_references(&turn("nothing to link", &[]));
        assert_eq!(plan.segments, vec![text("nothing to link")]);
    }

    #[test]
    fn indices_follow_recipe_order() {
        let plan = resolve_references(&turn(
            "Pancakes or Omelet? Omelet is faster.",
            &["Omelet", "Pancakes"],
        ));
        assert_eq!(
            plan.segments,
            vec![
                link(1, "Pancakes"),
                text(" or "),
                link(0, "Omelet"),
                text("? Omelet is faster."),
            ]
        );
    }

    #[test]
    fn paraphrased_titles_get_no_link() {
        let plan = resolve_references(&turn("How about a tofu bowl?", &["Spicy Tofu Bowl"]));
        assert_eq!(plan.segments, vec![text("How about a tofu bowl?")]);
    }

    #[test]
    fn earlier_link_consumes_overlapping_title() {
        // "Tofu Bowl" first occurs inside the already linked span, so it is lost
        // even though a plain "Tofu Bowl" follows.
        let plan = resolve_references(&turn(
            "Spicy Tofu Bowl or a plain Tofu Bowl",
            &["Spicy Tofu Bowl", "Tofu Bowl"],
        ));
        assert_eq!(
            plan.segments,
            vec![link(0, "Spicy Tofu Bowl"), text(" or a plain Tofu Bowl")]
        );
    }

    #[test]
    fn matches_spanning_a_link_are_dropped() {
        let plan = resolve_references(&turn("Mac and Cheese", &["Cheese", "and Cheese"]));
        assert_eq!(plan.segments, vec![text("Mac and "), link(0, "Cheese")]);
    }

    #[test]
    fn markup_is_kept_as_text() {
        let content = "<b onclick=\"x()\">Pasta</b> & more";
        let plan = resolve_references(&turn(content, &["Pasta"]));
        assert_eq!(plan.text(), content);
        assert_eq!(
            plan.segments,
            vec![text("<b onclick=\"x()\">"), link(0, "Pasta"), text("</b> & more")]
        );
    }

    #[test]
    fn empty_titles_are_skipped() {
        let plan = resolve_references(&turn("Soup", &["", "Soup"]));
        assert_eq!(plan.segments, vec![link(1, "Soup")]);
    }
}
