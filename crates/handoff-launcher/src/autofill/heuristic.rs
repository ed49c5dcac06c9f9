use super::{AutofillTarget, FieldInfo, KeyStroke, Rect, WindowInfo};

const MIN_FIELD_WIDTH: i32 = 60;
const MIN_FIELD_HEIGHT: i32 = 12;
const MAX_FIELD_HEIGHT: i32 = 60;
const MIN_WINDOW_SIDE: i32 = 120;
const ALIGN_TOLERANCE_PX: i32 = 40;
const SAME_ROW_PX: i32 = 4;
const EDIT_CLASS_HINTS: [&str; 3] = ["edit", "textbox", "richedit"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPair {
    pub username: FieldInfo,
    pub server: FieldInfo,
}

/// Largest visible titled window, ignoring splash-sized ones.
pub fn pick_main_window(windows: &[WindowInfo]) -> Option<&WindowInfo> {
    windows
        .iter()
        .filter(|w| w.visible && !w.title.trim().is_empty())
        .filter(|w| w.rect.width() >= MIN_WINDOW_SIDE && w.rect.height() >= MIN_WINDOW_SIDE)
        .max_by_key(|w| w.rect.area())
}

/// `None` means the field can never hold the username or server.
pub fn score_field(field: &FieldInfo, window: &Rect) -> Option<i32> {
    if !field.visible || !field.enabled || field.is_password {
        return None;
    }
    let class = field.class_name.to_ascii_lowercase();
    if !EDIT_CLASS_HINTS.iter().any(|hint| class.contains(hint)) {
        return None;
    }
    let width = field.rect.width();
    let height = field.rect.height();
    if width < MIN_FIELD_WIDTH || !(MIN_FIELD_HEIGHT..=MAX_FIELD_HEIGHT).contains(&height) {
        return None;
    }
    if !window.contains(&field.rect) {
        return None;
    }

    let mut score = 50;
    if class == "edit" {
        score += 10;
    }
    // wider single-line inputs are the likely login boxes
    score += (width / 50).min(10);
    if (18..=32).contains(&height) {
        score += 5;
    }
    Some(score)
}

/// Username is the topmost candidate; server is the lowest one left-aligned with it.
pub fn choose_fields(fields: &[FieldInfo], window: &Rect) -> Option<FieldPair> {
    let mut candidates = fields
        .iter()
        .filter_map(|f| score_field(f, window).map(|score| (score, f)))
        .collect::<Vec<_>>();
    if candidates.len() < 2 {
        return None;
    }
    candidates.sort_by(|(sa, a), (sb, b)| {
        a.rect
            .top
            .cmp(&b.rect.top)
            .then_with(|| sb.cmp(sa))
            .then_with(|| a.rect.left.cmp(&b.rect.left))
    });

    let (_, username) = candidates[0];
    let server = candidates[1..]
        .iter()
        .map(|(_, f)| *f)
        .filter(|f| f.rect.top > username.rect.top + SAME_ROW_PX)
        .filter(|f| (f.rect.left - username.rect.left).abs() <= ALIGN_TOLERANCE_PX)
        .max_by_key(|f| f.rect.top)?;

    Some(FieldPair {
        username: username.clone(),
        server: server.clone(),
    })
}

/// Username, then two tabs past the password box, then server.
pub fn keystroke_plan(target: &AutofillTarget) -> Vec<KeyStroke> {
    let mut keys = Vec::new();
    if let Some(username) = target.username.as_deref().filter(|v| !v.is_empty()) {
        keys.push(KeyStroke::Text(username.to_string()));
    }
    keys.push(KeyStroke::Tab);
    keys.push(KeyStroke::Tab);
    if let Some(server) = target.server.as_deref().filter(|v| !v.is_empty()) {
        keys.push(KeyStroke::Text(server.to_string()));
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window_rect() -> Rect {
        Rect::new(0, 0, 800, 600)
    }

    fn field(handle: usize, class: &str, rect: Rect) -> FieldInfo {
        FieldInfo {
            handle,
            class_name: class.to_string(),
            rect,
            visible: true,
            enabled: true,
            is_password: false,
        }
    }

    fn window(handle: usize, title: &str, rect: Rect) -> WindowInfo {
        WindowInfo {
            handle,
            pid: 1,
            title: title.to_string(),
            rect,
            visible: true,
        }
    }

    #[test]
    fn score_rejects_non_edit_tiny_and_password_fields() {
        let w = window_rect();
        assert!(score_field(&field(1, "Button", Rect::new(10, 10, 200, 34)), &w).is_none());
        assert!(score_field(&field(2, "Edit", Rect::new(10, 10, 40, 34)), &w).is_none());
        assert!(score_field(&field(3, "Edit", Rect::new(10, 10, 200, 200)), &w).is_none());
        assert!(score_field(&field(4, "Edit", Rect::new(700, 10, 900, 34)), &w).is_none());
        let mut password = field(5, "Edit", Rect::new(10, 10, 200, 34));
        password.is_password = true;
        assert!(score_field(&password, &w).is_none());
        assert!(score_field(&field(6, "WindowsForms10.EDIT.app.0", Rect::new(10, 10, 200, 34)), &w).is_some());
    }

    #[test]
    fn choose_picks_top_username_and_lowest_aligned_server() {
        let fields = vec![
            field(3, "Edit", Rect::new(100, 300, 400, 324)),
            field(1, "Edit", Rect::new(100, 100, 400, 124)),
            field(2, "Edit", Rect::new(100, 200, 400, 224)),
            // search box far to the right is not aligned with the username column
            field(9, "Edit", Rect::new(600, 500, 780, 524)),
        ];
        let pair = choose_fields(&fields, &window_rect()).expect("pair");
        assert_eq!(pair.username.handle, 1);
        assert_eq!(pair.server.handle, 3);
    }

    #[test]
    fn choose_needs_two_rows() {
        let fields = vec![
            field(1, "Edit", Rect::new(100, 100, 400, 124)),
            field(2, "Edit", Rect::new(420, 101, 700, 125)),
        ];
        assert!(choose_fields(&fields, &window_rect()).is_none());
        assert!(choose_fields(&fields[..1], &window_rect()).is_none());
    }

    #[test]
    fn main_window_is_largest_visible_titled() {
        let mut hidden = window(3, "Hidden", Rect::new(0, 0, 1000, 1000));
        hidden.visible = false;
        let windows = vec![
            window(1, "Splash", Rect::new(0, 0, 100, 100)),
            window(2, "SmartConsole", Rect::new(0, 0, 600, 500)),
            window(4, "", Rect::new(0, 0, 900, 900)),
            hidden,
        ];
        assert_eq!(pick_main_window(&windows).map(|w| w.handle), Some(2));
    }

    #[test]
    fn keystroke_plan_skips_password_box() {
        let plan = keystroke_plan(&AutofillTarget {
            username: Some("admin".to_string()),
            server: None,
        });
        assert_eq!(
            plan,
            vec![
                KeyStroke::Text("admin".to_string()),
                KeyStroke::Tab,
                KeyStroke::Tab
            ]
        );
    }
}
