//! A PGN reader: header tags, movetext tokenization, and multi-game splitting.
//!
//! This module only reads PGN; nothing here writes it back out. Movetext is tokenized rather
//! than fully parsed against a board -- turning SAN tokens into moves is the converter's job,
//! not this one's -- but move numbers, result markers, comments, and variations are all
//! recognized and stripped so what remains is a clean list of SAN move tokens.

use crate::error::{Error, Result};

/// One `[Name "Value"]` header tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

/// A single parsed game: its header tags, the SAN tokens of its movetext in order, and the
/// result string if the movetext ended with one (`1-0`, `0-1`, `1/2-1/2`, or `*`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Game {
    pub tags: Vec<Tag>,
    pub moves: Vec<String>,
    pub result: Option<String>,
}

impl Game {
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.iter().find(|t| t.name == name).map(|t| t.value.as_str())
    }
}

fn is_result_token(token: &str) -> bool {
    matches!(token, "1-0" | "0-1" | "1/2-1/2" | "*")
}

/// True for a move-number token such as `1.`, `1...`, or `12.`.
fn is_move_number(token: &str) -> bool {
    let digits_end = token.find(|c: char| !c.is_ascii_digit()).unwrap_or(token.len());
    digits_end > 0 && token[digits_end..].chars().all(|c| c == '.')
}

fn is_square(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 2 && (b'a'..=b'h').contains(&b[0]) && (b'1'..=b'8').contains(&b[1])
}

/// Checks `body` (with any promotion suffix already removed) against the shape
/// `[NBRQK]?[a-h]?[1-8]?x?[a-h][1-8]`.
fn is_san_move_body(body: &str) -> bool {
    let body = body.replacen('x', "", 1);
    let rest = match body.chars().next() {
        Some(c) if "NBRQK".contains(c) => &body[1..],
        _ => body.as_str(),
    };
    if rest.len() < 2 {
        return false;
    }
    let (prefix, dest) = rest.split_at(rest.len() - 2);
    if !is_square(dest) || prefix.len() > 2 {
        return false;
    }
    let mut file_seen = false;
    let mut rank_seen = false;
    for c in prefix.chars() {
        if ('a'..='h').contains(&c) && !file_seen {
            file_seen = true;
        } else if ('1'..='8').contains(&c) && !rank_seen {
            rank_seen = true;
        } else {
            return false;
        }
    }
    true
}

/// Validates and cleans one movetext token: strips `!?` annotations and trailing `+`/`#`, then
/// checks it is a castling token or matches the SAN move shape. Returns `None` for anything
/// else (move numbers, result tokens, and authoring noise such as en-passant `e.p.` markers are
/// all rejected here, the last silently per the source behavior this preserves).
fn clean_move_token(token: &str) -> Option<String> {
    let cleaned: String = token
        .trim_end_matches(|c| matches!(c, '+' | '#' | '!' | '?'))
        .to_owned();

    if matches!(cleaned.as_str(), "O-O" | "O-O-O" | "0-0" | "0-0-0") {
        return Some(cleaned);
    }

    let (body, promotion) = match cleaned.split_once('=') {
        Some((body, letter)) if matches!(letter, "N" | "B" | "R" | "Q") => (body, Some(letter)),
        Some(_) => return None,
        None => (cleaned.as_str(), None),
    };

    if !is_san_move_body(body) {
        return None;
    }

    Some(match promotion {
        Some(letter) => format!("{body}={letter}"),
        None => body.to_owned(),
    })
}

/// Splits movetext into tokens, treating `{...}` comments, `(...)` variations (which may
/// nest), and `$N` NAGs as single units to be discarded, and everything else as
/// whitespace-separated.
fn tokenize_movetext(text: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.peek().copied() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '{' {
            chars.next();
            let mut depth = 1;
            while depth > 0 {
                match chars.next() {
                    Some((_, '}')) => depth -= 1,
                    Some(_) => (),
                    None => return Err(Error::InvalidInput("unterminated comment in PGN".into())),
                }
            }
            continue;
        }
        if c == '(' {
            chars.next();
            let mut depth = 1;
            while depth > 0 {
                match chars.next() {
                    Some((_, '(')) => depth += 1,
                    Some((_, ')')) => depth -= 1,
                    Some(_) => (),
                    None => return Err(Error::InvalidInput("unterminated variation in PGN".into())),
                }
            }
            continue;
        }
        if c == '$' {
            chars.next();
            while matches!(chars.peek(), Some((_, d)) if d.is_ascii_digit()) {
                chars.next();
            }
            continue;
        }

        let mut token = String::new();
        while let Some((_, c)) = chars.peek().copied() {
            if c.is_whitespace() || c == '{' || c == '(' || c == '$' {
                break;
            }
            token.push(c);
            chars.next();
        }
        if !token.is_empty() {
            tokens.push(token);
        }
    }

    Ok(tokens)
}

/// Parses a single `[Name "Value"]` header line.
fn parse_tag_line(line: &str) -> Result<Tag> {
    let line = line.trim();
    let inner = line
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| Error::InvalidInput(format!("malformed PGN tag: {line}")))?;

    let (name, rest) = inner
        .split_once(char::is_whitespace)
        .ok_or_else(|| Error::InvalidInput(format!("malformed PGN tag: {line}")))?;

    let value = rest
        .trim()
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(|| Error::InvalidInput(format!("malformed PGN tag value: {line}")))?;

    Ok(Tag { name: name.to_owned(), value: value.to_owned() })
}

/// Parses exactly one game out of `pgn_text`: its tag section followed by its movetext.
pub fn parse_single_game(pgn_text: &str) -> Result<Game> {
    let mut tags = Vec::new();
    let mut movetext_lines = Vec::new();

    for line in pgn_text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with('[') {
            tags.push(parse_tag_line(trimmed)?);
        } else {
            movetext_lines.push(trimmed);
        }
    }

    let movetext = movetext_lines.join(" ");
    let raw_tokens = tokenize_movetext(&movetext)?;

    let mut moves = Vec::new();
    let mut result = None;
    for token in raw_tokens {
        if is_result_token(&token) {
            result = Some(token);
            break;
        } else if is_move_number(&token) {
            continue;
        } else if let Some(mv) = clean_move_token(&token) {
            moves.push(mv);
        }
    }

    Ok(Game { tags, moves, result })
}

/// Splits a multi-game PGN blob into per-game substrings, recognizing the start of a new game
/// as a `[Event ...]` tag line following any non-tag content.
fn split_games(multi_pgn_text: &str) -> Vec<String> {
    let mut games = Vec::new();
    let mut current = String::new();
    let mut seen_body = false;

    for line in multi_pgn_text.lines() {
        let trimmed = line.trim();
        let starts_new_game = trimmed.starts_with("[Event ") && seen_body;

        if starts_new_game {
            games.push(std::mem::take(&mut current));
            seen_body = false;
        }

        if !trimmed.is_empty() {
            seen_body = true;
        }

        current.push_str(line);
        current.push('\n');
    }

    if !current.trim().is_empty() {
        games.push(current);
    }

    games
}

/// Parses every game out of a blob containing one or more concatenated PGN games.
pub fn parse_multi_game(multi_pgn_text: &str) -> Result<Vec<Game>> {
    split_games(multi_pgn_text)
        .into_iter()
        .filter(|g| !g.trim().is_empty())
        .map(|g| parse_single_game(&g))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE_PGN: &str = r#"[Event "Casual Game"]
[Site "Berlin"]
[Date "1852.??.??"]
[White "Adolf Anderssen"]
[Black "Jean Dufresne"]
[Result "1-0"]

1.e4 e5 2.Nf3 Nc6 3.Bc4 Bc5 {a comment} 4.b4 Bxb4 5.c3 Ba5 1-0
"#;

    const EXAMPLE_MULTI_PGN: &str = r#"[Event "Game One"]
[Result "1-0"]

1.e4 e5 1-0

[Event "Game Two"]
[Result "0-1"]

1.d4 d5 0-1
"#;

    #[test]
    fn parses_tags_and_moves() {
        let game = parse_single_game(EXAMPLE_PGN).unwrap();
        assert_eq!(game.tag("White"), Some("Adolf Anderssen"));
        assert_eq!(game.result.as_deref(), Some("1-0"));
        assert_eq!(
            game.moves,
            vec!["e4", "e5", "Nf3", "Nc6", "Bc4", "Bc5", "b4", "Bxb4", "c3", "Ba5"]
        );
    }

    #[test]
    fn strips_comments_and_variations() {
        let pgn = "[Event \"X\"]\n\n1. e4 (1. d4 d5) e5 {good move} 2. Nf3 $1 Nc6 *";
        let game = parse_single_game(pgn).unwrap();
        assert_eq!(game.moves, vec!["e4", "e5", "Nf3", "Nc6"]);
        assert_eq!(game.result.as_deref(), Some("*"));
    }

    #[test]
    fn splits_multiple_games() {
        let games = parse_multi_game(EXAMPLE_MULTI_PGN).unwrap();
        assert_eq!(games.len(), 2);
        assert_eq!(games[0].tag("Event"), Some("Game One"));
        assert_eq!(games[1].tag("Event"), Some("Game Two"));
        assert_eq!(games[0].moves, vec!["e4", "e5"]);
        assert_eq!(games[1].moves, vec!["d4", "d5"]);
    }

    #[test]
    fn rejects_unterminated_comment() {
        let pgn = "[Event \"X\"]\n\n1. e4 {unterminated";
        assert!(parse_single_game(pgn).is_err());
    }
}
