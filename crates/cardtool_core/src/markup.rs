use scraper::{ElementRef, Html};
use scraper::node::Node;

/// Parsed page exposing the few queries card extraction needs.
pub struct PageMarkup {
    document: Html,
}

#[derive(Debug, Clone, Copy)]
pub struct MarkupElement<'a> {
    element: ElementRef<'a>,
}

impl PageMarkup {
    pub fn parse(source: &str) -> Self {
        Self {
            document: Html::parse_document(source),
        }
    }

    /// Every element carrying `marker` in its class list, in document order.
    pub fn elements_with_class<'a>(
        &'a self,
        marker: &'a str,
    ) -> impl Iterator<Item = MarkupElement<'a>> + 'a {
        self.document
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(move |element| element.value().classes().any(|class| class == marker))
            .map(|element| MarkupElement { element })
    }

    /// Trimmed text of the first element named `tag` anywhere in the page.
    pub fn first_text(&self, tag: &str) -> Option<String> {
        MarkupElement {
            element: self.document.root_element(),
        }
        .first_descendant_text(tag)
    }

    /// Position of the first `<script src>` referencing `reference`, counted
    /// over all script elements in source order.
    pub fn script_position(&self, reference: &str) -> Option<usize> {
        self.document
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|element| element.value().name().eq_ignore_ascii_case("script"))
            .position(|element| {
                element
                    .value()
                    .attr("src")
                    .is_some_and(|src| script_src_matches(src, reference))
            })
    }
}

impl<'a> MarkupElement<'a> {
    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.element.value().attr(name)
    }

    /// Text content of the first descendant named `tag`, inner markup
    /// stripped and entities decoded. `None` when missing or blank.
    pub fn first_descendant_text(&self, tag: &str) -> Option<String> {
        let heading = self
            .element
            .descendants()
            .skip(1)
            .filter_map(ElementRef::wrap)
            .find(|element| element.value().name().eq_ignore_ascii_case(tag))?;
        let text = heading
            .descendants()
            .filter_map(|node| match node.value() {
                Node::Text(text) => Some(&**text),
                _ => None,
            })
            .collect::<String>();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

fn script_src_matches(src: &str, reference: &str) -> bool {
    let path = src
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim();
    let path = path.trim_start_matches("./").trim_start_matches('/');
    let reference = reference.trim_start_matches("./").trim_start_matches('/');
    !reference.is_empty() && (path == reference || path.ends_with(&format!("/{reference}")))
}
