//! Terminal formatting for search results

use crate::index::types::SearchMatch;
use std::io::{self, Write};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Positions printed per hit before eliding the rest
const MAX_POSITIONS_SHOWN: usize = 12;

/// Print matches to stdout, one line per document
pub fn print_matches(matches: &[SearchMatch], ranked: bool, color: bool) -> io::Result<()> {
    let choice = if color {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    let mut stdout = StandardStream::stdout(choice);
    write_matches(&mut stdout, matches, ranked)?;

    if matches.is_empty() {
        stdout.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)))?;
        writeln!(stdout, "No matches.")?;
        stdout.reset()?;
    }
    Ok(())
}

/// `path` then `[score]` (ranked only) then `@ positions`
pub fn write_matches<W: WriteColor>(out: &mut W, matches: &[SearchMatch], ranked: bool) -> io::Result<()> {
    for m in matches {
        out.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)).set_bold(true))?;
        write!(out, "{}", m.path.display())?;
        out.reset()?;

        if ranked {
            out.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)))?;
            write!(out, " [{:.4}]", m.score)?;
            out.reset()?;
        }

        if !m.positions.is_empty() {
            out.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
            let shown: Vec<String> = m
                .positions
                .iter()
                .take(MAX_POSITIONS_SHOWN)
                .map(|p| p.to_string())
                .collect();
            write!(out, " @ {}", shown.join(","))?;
            if m.positions.len() > MAX_POSITIONS_SHOWN {
                write!(out, ",... ({} total)", m.positions.len())?;
            }
            out.reset()?;
        }
        writeln!(out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use termcolor::NoColor;

    fn hit(path: &str, positions: Vec<u32>, score: f64) -> SearchMatch {
        SearchMatch {
            doc_id: 0,
            path: PathBuf::from(path),
            positions,
            score,
        }
    }

    #[test]
    fn test_exact_format() {
        let mut out = NoColor::new(Vec::new());
        write_matches(&mut out, &[hit("/a/b.txt", vec![1, 4], 0.0)], false).unwrap();
        assert_eq!(String::from_utf8(out.into_inner()).unwrap(), "/a/b.txt @ 1,4\n");
    }

    #[test]
    fn test_ranked_format_and_elision() {
        let mut out = NoColor::new(Vec::new());
        let positions = (0..20).collect();
        write_matches(&mut out, &[hit("x", positions, 1.23456)], true).unwrap();
        let text = String::from_utf8(out.into_inner()).unwrap();
        assert!(text.starts_with("x [1.2346] @ 0,1,2"));
        assert!(text.trim_end().ends_with("(20 total)"));
    }
}
