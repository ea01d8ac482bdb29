//! Script preparation for the host's classic dialect
//!
//! Bodies submitted through the envelope are wrapped in an immediately
//! invoked function that declares the output slot, suppresses host
//! dialogs for the duration of the run, and returns whatever the body
//! deposited in the slot. The host dialect predates modern scoping, so
//! everything here sticks to `var` and function scope.

/// Name of the variable a script body assigns its result to.
pub const RESULT_SLOT: &str = "__result";

/// Wrap a script body for submission.
///
/// The wrapper:
/// - declares [`RESULT_SLOT`] so an assignment in the body stays local;
/// - forces the host's interaction level to never-interact so a modal
///   dialog cannot park the run forever, restoring the previous level
///   whether the body completes or throws;
/// - rethrows body errors untouched so the gateway still sees the
///   original message and line;
/// - returns the slot value (the engine's absent value if the body
///   never assigned it).
pub fn wrap_body(body: &str) -> String {
    format!(
        "(function () {{\n\
         var {slot};\n\
         var __level = app.scriptPreferences.userInteractionLevel;\n\
         app.scriptPreferences.userInteractionLevel = UserInteractionLevels.neverInteract;\n\
         try {{\n\
         {body}\n\
         app.scriptPreferences.userInteractionLevel = __level;\n\
         }} catch (__err) {{\n\
         try {{ app.scriptPreferences.userInteractionLevel = __level; }} catch (__ignored) {{}}\n\
         throw __err;\n\
         }}\n\
         return {slot};\n\
         }})();\n",
        slot = RESULT_SLOT,
        body = body,
    )
}

/// Turn a bare expression into a body that stores the expression value
/// in the output slot. The parentheses keep object literals from being
/// parsed as blocks.
pub fn expression_body(expression: &str) -> String {
    format!("{RESULT_SLOT} = ({});", expression.trim())
}

/// Canned body summarising the active document: name, save state, and
/// counts for every object class an agent usually orients itself by.
pub const DOCUMENT_OVERVIEW_BODY: &str = r#"var doc = app.activeDocument;
var sel = app.selection;
var selTypes = [];
for (var i = 0; i < sel.length && i < 20; i++) {
    selTypes.push(sel[i].constructor.name);
}
__result = {
    name: doc.name,
    saved: doc.saved,
    modified: doc.modified,
    pages: doc.pages.length,
    spreads: doc.spreads.length,
    stories: doc.stories.length,
    textFrames: doc.textFrames.length,
    rectangles: doc.rectangles.length,
    ovals: doc.ovals.length,
    graphicLines: doc.graphicLines.length,
    placedGraphics: doc.allGraphics.length,
    links: doc.links.length,
    layers: doc.layers.length,
    paragraphStyles: doc.allParagraphStyles.length,
    characterStyles: doc.allCharacterStyles.length,
    objectStyles: doc.allObjectStyles.length,
    swatches: doc.swatches.length,
    selectionCount: sel.length,
    selectionTypes: selTypes
};"#;

/// How much of the current selection to describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionDetail {
    /// Type, id and geometric bounds per selected item.
    Basic,
    /// Everything in [`SelectionDetail::Basic`] plus frame content,
    /// applied styles and link information.
    Full,
}

const SELECTION_BASIC_BODY: &str = r#"var sel = app.selection;
var items = [];
for (var i = 0; i < sel.length && i < 50; i++) {
    var it = sel[i];
    var entry = { type: it.constructor.name, id: it.id };
    try { entry.name = it.name; } catch (__e) {}
    try { entry.bounds = it.geometricBounds; } catch (__e) {}
    items.push(entry);
}
__result = { count: sel.length, items: items };"#;

const SELECTION_FULL_BODY: &str = r#"var sel = app.selection;
var items = [];
for (var i = 0; i < sel.length && i < 50; i++) {
    var it = sel[i];
    var entry = { type: it.constructor.name, id: it.id };
    try { entry.name = it.name; } catch (__e) {}
    try { entry.bounds = it.geometricBounds; } catch (__e) {}
    try { entry.page = it.parentPage === null ? null : it.parentPage.name; } catch (__e) {}
    try { entry.layer = it.itemLayer.name; } catch (__e) {}
    try { entry.fillColor = it.fillColor.name; } catch (__e) {}
    try {
        if (it.constructor.name === "TextFrame") {
            var text = it.contents;
            entry.contents = text.length > 400 ? text.substring(0, 400) + "..." : text;
            entry.overflows = it.overflows;
            entry.paragraphStyle = it.paragraphs.length > 0
                ? it.paragraphs[0].appliedParagraphStyle.name
                : null;
        }
    } catch (__e) {}
    try { entry.objectStyle = it.appliedObjectStyle.name; } catch (__e) {}
    try {
        if (it.allGraphics.length > 0) {
            var link = it.allGraphics[0].itemLink;
            entry.link = link === null ? null : { name: link.name, status: String(link.status) };
        }
    } catch (__e) {}
    items.push(entry);
}
__result = { count: sel.length, items: items };"#;

/// Canned body describing the current selection at the given detail.
pub fn selection_summary_body(detail: SelectionDetail) -> &'static str {
    match detail {
        SelectionDetail::Basic => SELECTION_BASIC_BODY,
        SelectionDetail::Full => SELECTION_FULL_BODY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapper_declares_and_returns_the_slot() {
        let wrapped = wrap_body("__result = 1 + 1;");
        assert!(wrapped.starts_with("(function () {"));
        assert!(wrapped.contains("var __result;"));
        assert!(wrapped.contains("__result = 1 + 1;"));
        assert!(wrapped.contains("return __result;"));
        assert!(wrapped.trim_end().ends_with("})();"));
    }

    #[test]
    fn wrapper_restores_interaction_level_on_both_paths() {
        let wrapped = wrap_body("doSomething();");
        assert!(wrapped.contains("UserInteractionLevels.neverInteract"));
        // One restore on the success path, one inside the catch.
        let restores = wrapped
            .matches("app.scriptPreferences.userInteractionLevel = __level;")
            .count();
        assert_eq!(restores, 2);
        assert!(wrapped.contains("throw __err;"));
    }

    #[test]
    fn expression_body_parenthesises_and_assigns() {
        assert_eq!(
            expression_body(" app.documents.length "),
            "__result = (app.documents.length);"
        );
        // Object literals must not parse as blocks.
        assert_eq!(expression_body("{a: 1}"), "__result = ({a: 1});");
    }

    #[test]
    fn canned_bodies_assign_the_slot() {
        assert!(DOCUMENT_OVERVIEW_BODY.contains("__result = {"));
        assert!(selection_summary_body(SelectionDetail::Basic).contains("__result = {"));
        assert!(selection_summary_body(SelectionDetail::Full).contains("appliedObjectStyle"));
        assert!(selection_summary_body(SelectionDetail::Full).contains("parentPage"));
    }
}
