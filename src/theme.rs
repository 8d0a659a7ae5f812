pub mod catppuccin {
    use nu_ansi_term::Color;
    pub struct Mocha;
    impl Mocha {
        // Base colors
        pub const TEXT: Color = Color::Rgb(205, 214, 244);
        pub const SUBTEXT0: Color = Color::Rgb(166, 173, 200);
        pub const SURFACE1: Color = Color::Rgb(69, 71, 90);
        pub const SURFACE2: Color = Color::Rgb(108, 112, 134); // Subtle dim

        // Accents
        pub const RED: Color = Color::Rgb(243, 139, 168);
        pub const GREEN: Color = Color::Rgb(166, 227, 161);
        pub const YELLOW: Color = Color::Rgb(249, 226, 175);
        pub const BLUE: Color = Color::Rgb(137, 180, 250);
        pub const MAUVE: Color = Color::Rgb(203, 166, 247);
        pub const PEACH: Color = Color::Rgb(250, 179, 135);
        pub const TEAL: Color = Color::Rgb(148, 226, 213);
        pub const SKY: Color = Color::Rgb(137, 220, 235);
    }
}

/// The same palette for terminal widgets.
pub fn to_ratatui(color: nu_ansi_term::Color) -> ratatui::style::Color {
    use nu_ansi_term::Color as A;
    use ratatui::style::Color as R;
    match color {
        A::Rgb(r, g, b) => R::Rgb(r, g, b),
        A::Fixed(n) => R::Indexed(n),
        _ => R::Reset,
    }
}

/// Color of one Brainfuck character in the palette.
pub fn instruction_color(ch: char) -> nu_ansi_term::Color {
    use catppuccin::Mocha as P;
    match ch {
        '>' => P::SKY,
        '<' => P::TEAL,
        '+' => P::GREEN,
        '-' => P::RED,
        '.' => P::YELLOW,
        ',' => P::PEACH,
        '[' | ']' => P::MAUVE,
        _ => P::SURFACE2,
    }
}
