//! Parsers for the two engine responses the session must correlate: `bestmove` and `info`.
//!
//! Both are single-shot over one line; neither keeps state across calls.

/// Checks whether `s` is a LAN move: `<file><rank><file><rank>` with an optional promotion
/// letter, e.g. `e2e4` or `e7e8q`.
fn is_lan_move(s: &str) -> bool {
    let b = s.as_bytes();
    if b.len() != 4 && b.len() != 5 {
        return false;
    }
    let file_ok = |c: u8| (b'a'..=b'h').contains(&c);
    let rank_ok = |c: u8| (b'1'..=b'8').contains(&c);
    if !(file_ok(b[0]) && rank_ok(b[1]) && file_ok(b[2]) && rank_ok(b[3])) {
        return false;
    }
    if b.len() == 5 && !matches!(b[4], b'q' | b'r' | b'b' | b'n') {
        return false;
    }
    true
}

/// Parses a `bestmove` line, returning the chosen move. Returns `None` if the line does not
/// match `^bestmove\s+<move>(\s+ponder\s+<move>)?\s*$`. The ponder move, if any, is discarded.
pub fn parse_bestmove(line: &str) -> Option<String> {
    let mut tokens = line.split_whitespace();
    if tokens.next()? != "bestmove" {
        return None;
    }

    let best = tokens.next()?;
    if !is_lan_move(best) {
        return None;
    }

    match (tokens.next(), tokens.next()) {
        (None, None) => Some(best.to_owned()),
        (Some("ponder"), Some(ponder)) if is_lan_move(ponder) && tokens.next().is_none() => {
            Some(best.to_owned())
        }
        _ => None,
    }
}

/// A parsed `info` line. Every field is absent unless the corresponding token was observed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UciInfoLine {
    pub depth: Option<u32>,
    pub sel_depth: Option<u32>,
    pub multi_pv: Option<u32>,
    pub score_cp: Option<i64>,
    pub score_mate: Option<i64>,
    pub nodes: Option<u64>,
    pub nps: Option<u64>,
    pub hash_full: Option<u32>,
    pub tb_hits: Option<u64>,
    pub time_ms: Option<u64>,
    pub pv: Option<String>,
}

impl UciInfoLine {
    /// Whether the engine reported either a centipawn or mate score on this line.
    pub fn has_score(&self) -> bool {
        self.score_cp.is_some() || self.score_mate.is_some()
    }
}

/// Token-driven state machine over an `info` line. Unknown keywords are ignored along with the
/// single argument token that follows them; `pv` swallows the remainder of the line.
pub fn parse_info(line: &str) -> UciInfoLine {
    let mut info = UciInfoLine::default();

    let rest = line.strip_prefix("info").unwrap_or(line);
    let mut tokens = rest.split_whitespace().peekable();

    while let Some(token) = tokens.next() {
        match token {
            "depth" => info.depth = next_int(&mut tokens),
            "seldepth" => info.sel_depth = next_int(&mut tokens),
            "multipv" => info.multi_pv = next_int(&mut tokens),
            "nodes" => info.nodes = next_int(&mut tokens),
            "nps" => info.nps = next_int(&mut tokens),
            "hashfull" => info.hash_full = next_int(&mut tokens),
            "tbhits" => info.tb_hits = next_int(&mut tokens),
            "time" => info.time_ms = next_int(&mut tokens),
            "score" => match tokens.next() {
                Some("cp") => info.score_cp = next_int(&mut tokens),
                Some("mate") => info.score_mate = next_int(&mut tokens),
                _ => (),
            },
            "pv" => {
                let pv: Vec<&str> = tokens.by_ref().collect();
                if !pv.is_empty() {
                    info.pv = Some(pv.join(" "));
                }
                break;
            }
            _ => {
                // Unrecognized keyword: skip its single argument, if any, and move on.
                tokens.next();
            }
        }
    }

    info
}

fn next_int<T: std::str::FromStr>(
    tokens: &mut std::iter::Peekable<std::str::SplitWhitespace>,
) -> Option<T> {
    tokens.next().and_then(|t| t.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bestmove_round_trips_valid_move() {
        assert_eq!(parse_bestmove("bestmove e2e4"), Some("e2e4".to_owned()));
        assert_eq!(
            parse_bestmove("bestmove e7e8q ponder d7d6"),
            Some("e7e8q".to_owned())
        );
    }

    #[test]
    fn bestmove_rejects_invalid_lines() {
        assert_eq!(parse_bestmove("bestmove"), None);
        assert_eq!(parse_bestmove("bestmove z9z9"), None);
        assert_eq!(parse_bestmove("info depth 1"), None);
        assert_eq!(parse_bestmove("bestmove e2e4 garbage"), None);
    }

    #[test]
    fn info_extracts_known_fields() {
        let info = parse_info("info depth 12 seldepth 18 multipv 2 score cp 34 nodes 12345 nps 500000 hashfull 123 tbhits 0 time 987 pv e2e4 e7e5 g1f3");
        assert_eq!(info.depth, Some(12));
        assert_eq!(info.sel_depth, Some(18));
        assert_eq!(info.multi_pv, Some(2));
        assert_eq!(info.score_cp, Some(34));
        assert_eq!(info.score_mate, None);
        assert_eq!(info.nodes, Some(12345));
        assert_eq!(info.nps, Some(500000));
        assert_eq!(info.hash_full, Some(123));
        assert_eq!(info.tb_hits, Some(0));
        assert_eq!(info.time_ms, Some(987));
        assert_eq!(info.pv.as_deref(), Some("e2e4 e7e5 g1f3"));
    }

    #[test]
    fn info_without_score_leaves_it_unset() {
        let info = parse_info("info depth 1 nodes 20 pv e2e4");
        assert!(!info.has_score());
    }

    #[test]
    fn info_parses_mate_score() {
        let info = parse_info("info depth 5 score mate 3 pv e2e4");
        assert_eq!(info.score_mate, Some(3));
    }

    #[test]
    fn info_ignores_unknown_keywords() {
        let info = parse_info("info depth 4 currmove e2e4 currmovenumber 1 score cp 5 pv e2e4");
        assert_eq!(info.depth, Some(4));
        assert_eq!(info.score_cp, Some(5));
        assert_eq!(info.pv.as_deref(), Some("e2e4"));
    }

    proptest::proptest! {
        #[test]
        fn depth_is_at_least_seldepth_when_both_present(depth in 0u32..200, extra in 0u32..50) {
            let seldepth = depth + extra;
            let line = format!("info depth {depth} seldepth {seldepth} score cp 0 pv e2e4");
            let info = parse_info(&line);
            if let (Some(d), Some(sd)) = (info.depth, info.sel_depth) {
                prop_assert!(d <= sd);
            }
        }
    }
}
