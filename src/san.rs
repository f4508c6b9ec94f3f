//! Converts Standard Algebraic Notation to Long Algebraic Notation against a [`Board`].
//!
//! Resolution works by generating every occupied square of the matching piece kind and color, in
//! rank-then-file scan order, then filtering by destination reachability and any disambiguating
//! file/rank/square the SAN token carries. If more than one candidate survives -- the token
//! under-disambiguates -- the first one in scan order wins rather than the move being rejected.

use crate::board::{Board, Color, Move, Piece, PieceKind, Square};
use crate::error::{Error, Result};

/// Strips trailing check (`+`), checkmate (`#`), and NAG-style annotation glyphs (`!`, `?`) from
/// a SAN token, leaving the move text proper.
fn strip_annotations(token: &str) -> &str {
    token.trim_end_matches(['+', '#', '!', '?'])
}

/// Resolves one SAN token to a concrete [`Move`] on `board`, without mutating it.
pub fn resolve_san(board: &Board, token: &str) -> Result<Move> {
    let token = strip_annotations(token.trim());
    if token.is_empty() {
        return Err(Error::InvalidInput("empty SAN token".into()));
    }

    if token == "O-O" || token == "0-0" {
        return castling_move(board, true);
    }
    if token == "O-O-O" || token == "0-0-0" {
        return castling_move(board, false);
    }

    let (body, promotion) = split_promotion(token)?;
    let (kind, rest) = split_piece_kind(body);
    let rest = rest.replace('x', "");
    let rest = rest.as_str();

    if rest.len() < 2 {
        return Err(Error::InvalidInput(format!("malformed SAN move: {token}")));
    }
    let (disambiguation, dest_str) = rest.split_at(rest.len() - 2);
    let to = Square::parse(dest_str)
        .ok_or_else(|| Error::InvalidInput(format!("malformed destination in: {token}")))?;

    let (disambig_file, disambig_rank) = parse_disambiguation(disambiguation)?;

    if kind == PieceKind::Pawn && promotion.is_none() && (to.rank == 0 || to.rank == 7) {
        return Err(Error::InvalidInput(format!(
            "pawn move to the back rank requires a promotion suffix: {token}"
        )));
    }

    let color = board.side_to_move;
    let candidates: Vec<Square> = board
        .find_pieces(color, kind)
        .into_iter()
        .filter(|&from| disambig_file.map_or(true, |f| from.file == f))
        .filter(|&from| disambig_rank.map_or(true, |r| from.rank == r))
        .filter(|&from| {
            let piece = Piece { color, kind };
            board.can_reach(from, to, piece)
        })
        .collect();

    // `find_pieces` yields squares in rank-then-file scan order, so when the disambiguation in
    // the token is insufficient to narrow to one candidate, the first of these is used. This is
    // a deliberate, documented behavior for otherwise-ambiguous (malformed) SAN, not a bug.
    match candidates.first() {
        None => Err(Error::InvalidMove(format!("no {kind:?} can reach {to} ({token})"))),
        Some(from) => Ok(Move { from: *from, to, promotion }),
    }
}

/// Converts SAN directly to the LAN string a UCI engine expects.
pub fn resolve_san_to_lan(board: &Board, token: &str) -> Result<String> {
    Ok(resolve_san(board, token)?.to_lan())
}

fn castling_move(board: &Board, kingside: bool) -> Result<Move> {
    let rank = match board.side_to_move {
        Color::White => 0,
        Color::Black => 7,
    };
    let king_from = Square::new(4, rank).unwrap();
    let king_to = if kingside {
        Square::new(6, rank).unwrap()
    } else {
        Square::new(2, rank).unwrap()
    };

    let allowed = match (board.side_to_move, kingside) {
        (Color::White, true) => board.castling.white_kingside,
        (Color::White, false) => board.castling.white_queenside,
        (Color::Black, true) => board.castling.black_kingside,
        (Color::Black, false) => board.castling.black_queenside,
    };
    if !allowed {
        return Err(Error::InvalidMove("castling rights no longer available".into()));
    }

    Ok(Move { from: king_from, to: king_to, promotion: None })
}

/// Splits a trailing `=X` promotion suffix off a SAN move body, if present.
fn split_promotion(token: &str) -> Result<(&str, Option<PieceKind>)> {
    match token.split_once('=') {
        Some((body, letter)) => {
            let kind = letter
                .chars()
                .next()
                .and_then(PieceKind::from_san_letter)
                .ok_or_else(|| Error::InvalidInput(format!("invalid promotion suffix: {token}")))?;
            Ok((body, Some(kind)))
        }
        None => Ok((token, None)),
    }
}

/// Splits a leading piece letter off a SAN move body. A pawn move carries no letter.
fn split_piece_kind(body: &str) -> (PieceKind, &str) {
    match body.chars().next().and_then(PieceKind::from_san_letter) {
        Some(kind) => (kind, &body[1..]),
        None => (PieceKind::Pawn, body),
    }
}

/// Parses the 0-2 disambiguating characters preceding the destination square, returning
/// whichever of file/rank were specified.
fn parse_disambiguation(s: &str) -> Result<(Option<u8>, Option<u8>)> {
    let mut file = None;
    let mut rank = None;
    for c in s.chars() {
        if ('a'..='h').contains(&c) {
            file = Some(c as u8 - b'a');
        } else if ('1'..='8').contains(&c) {
            rank = Some(c as u8 - b'1');
        } else {
            return Err(Error::InvalidInput(format!("invalid disambiguation: {s}")));
        }
    }
    Ok((file, rank))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_pawn_push() {
        let board = Board::starting_position();
        let mv = resolve_san(&board, "e4").unwrap();
        assert_eq!(mv.to_lan(), "e2e4");
    }

    #[test]
    fn knight_development() {
        let board = Board::starting_position();
        let mv = resolve_san(&board, "Nf3").unwrap();
        assert_eq!(mv.to_lan(), "g1f3");
    }

    #[test]
    fn kingside_castling_after_clearing() {
        let mut board = Board::starting_position();
        board.apply_move(Move { from: Square::parse("g1").unwrap(), to: Square::parse("h3").unwrap(), promotion: None });
        board.apply_move(Move { from: Square::parse("e7").unwrap(), to: Square::parse("e5").unwrap(), promotion: None });
        board.apply_move(Move { from: Square::parse("f1").unwrap(), to: Square::parse("c4").unwrap(), promotion: None });
        board.apply_move(Move { from: Square::parse("b8").unwrap(), to: Square::parse("c6").unwrap(), promotion: None });
        let mv = resolve_san(&board, "O-O").unwrap();
        assert_eq!(mv.to_lan(), "e1g1");
    }

    #[test]
    fn rejects_move_with_no_candidate() {
        let board = Board::starting_position();
        assert!(resolve_san(&board, "Nf6").is_err());
    }

    #[test]
    fn ambiguous_move_falls_back_to_first_scan_order_candidate() {
        let mut board = Board::starting_position();
        for (from, to) in [
            ("d2", "d4"),
            ("e7", "e5"),
            ("g1", "f3"),
            ("b8", "c6"),
        ] {
            board.apply_move(Move { from: Square::parse(from).unwrap(), to: Square::parse(to).unwrap(), promotion: None });
        }
        // Both the b1 and f3 knights can now reach d2; b1 comes first in rank-then-file scan
        // order, so an undisambiguated "Nd2" silently resolves to it.
        assert_eq!(resolve_san(&board, "Nd2").unwrap().to_lan(), "b1d2");
        assert_eq!(resolve_san(&board, "Nbd2").unwrap().to_lan(), "b1d2");
        assert_eq!(resolve_san(&board, "Nfd2").unwrap().to_lan(), "f3d2");
    }

    #[test]
    fn promotion_requires_suffix_on_back_rank() {
        let mut board = Board::starting_position();
        for (from, to) in [
            ("a2", "a4"),
            ("h7", "h6"),
            ("a4", "a5"),
            ("h6", "h5"),
            ("a5", "a6"),
            ("h5", "h4"),
            ("a6", "b7"),
            ("h4", "h3"),
        ] {
            board.apply_move(Move { from: Square::parse(from).unwrap(), to: Square::parse(to).unwrap(), promotion: None });
        }
        assert!(resolve_san(&board, "bxc8").is_err());
        assert_eq!(resolve_san(&board, "bxc8=Q").unwrap().to_lan(), "b7c8=Q");
    }
}
