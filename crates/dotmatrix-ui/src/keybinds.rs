use dotmatrix_core::input::Button;
use winit::keyboard::KeyCode;

/// Default key mapping: arrows for the pad, Z/X for A/B, Backspace/Enter for
/// Select/Start.
pub fn button_for_key(key: KeyCode) -> Option<Button> {
    match key {
        KeyCode::ArrowRight => Some(Button::Right),
        KeyCode::ArrowLeft => Some(Button::Left),
        KeyCode::ArrowUp => Some(Button::Up),
        KeyCode::ArrowDown => Some(Button::Down),
        KeyCode::KeyZ => Some(Button::A),
        KeyCode::KeyX => Some(Button::B),
        KeyCode::Backspace => Some(Button::Select),
        KeyCode::Enter => Some(Button::Start),
        _ => None,
    }
}
