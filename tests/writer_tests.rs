use pretty_assertions::assert_eq;
use proptest::prelude::*;
use shell_powerline::color::{make_colors, ColorResolver, Palette};
use shell_powerline::terminal::{str_width, strip_ansi, Shell, Writer};

fn writer(shell: Shell) -> Writer {
    Writer::new(shell, ColorResolver::new(make_colors(None, false, None, true)))
}

#[test]
fn test_transparent_pair_emits_no_color_codes() {
    let mut writer = writer(Shell::Generic);
    writer.set_colors("transparent", "transparent");
    writer.write("", "", "hidden");

    let (text, length) = writer.string();
    assert!(!text.contains('\x1b'));
    assert_eq!(length, 6);
}

#[test]
fn test_override_inside_blue_segment() {
    let mut writer = writer(Shell::Generic);
    writer.set_colors("", "blue");
    writer.write("", "", "<red>hi</>");

    let (text, length) = writer.string();
    assert_eq!(text, "\x1b[31mhi\x1b[0m");
    assert_eq!(length, 2);
}

#[test]
fn test_palette_reference() {
    let palette: Palette = [("brand".to_string(), "green".to_string())].into_iter().collect();
    let mut writer = Writer::new(
        Shell::Generic,
        ColorResolver::new(make_colors(Some(palette), false, None, true)),
    );
    writer.set_colors("", "p:brand");
    writer.write("", "", "x");

    assert_eq!(writer.string().0, "\x1b[32mx\x1b[0m");
}

#[test]
fn test_zsh_wraps_every_escape() {
    let mut writer = writer(Shell::Zsh);
    writer.set_colors("red", "white");
    writer.write("", "", "a<blue>b</>c");

    let (text, _) = writer.string();
    let unwrapped = text.replace("%{", "").replace("%}", "");
    assert_eq!(strip_ansi(&unwrapped), "abc");
    assert_eq!(text.matches("%{").count(), text.matches("%}").count());
}

proptest! {
    #[test]
    fn stripped_output_keeps_text_and_width(text in "[a-z \u{e0a0}\u{e0b0}漢]{0,24}") {
        let mut writer = writer(Shell::Generic);
        writer.set_colors("black", "white");
        writer.write("", "", &text);

        let (output, length) = writer.string();
        let visible = strip_ansi(&output);

        prop_assert_eq!(&visible, &text);
        prop_assert_eq!(length, str_width(&text));
    }

    #[test]
    fn rendering_is_idempotent(text in "[a-z<>/,]{0,20}") {
        let render = |text: &str| {
            let mut writer = writer(Shell::Bash);
            writer.set_colors("blue", "yellow");
            writer.write("", "", text);
            writer.string()
        };

        prop_assert_eq!(render(&text), render(&text));
    }
}
