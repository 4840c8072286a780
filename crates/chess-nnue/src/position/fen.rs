//! FEN の読み書き

use super::{BLACK_OO, BLACK_OOO, Position, WHITE_OO, WHITE_OOO};
use crate::types::{Color, Piece, PieceType, Square};

/// 平手初期局面
pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// 盤上に置ける駒の上限（キングを含む）
pub const MAX_PIECES: i32 = 32;

/// FEN 解析エラー
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FenError {
    #[error("FEN has no piece placement field")]
    MissingPlacement,

    #[error("invalid character '{0}' in piece placement")]
    InvalidPiece(char),

    #[error("piece placement does not describe 8x8 squares")]
    BadBoardShape,

    #[error("invalid side to move: {0}")]
    InvalidSideToMove(String),

    #[error("too many pieces on the board: {0} (max {MAX_PIECES})")]
    TooManyPieces(i32),

    #[error("more than one {0:?} king on the board")]
    TooManyKings(Color),

    #[error("invalid {field} field: {value}")]
    InvalidField { field: &'static str, value: String },
}

impl Position {
    /// FEN 文字列から局面を設定する
    ///
    /// 手番以降のフィールドは省略可能（省略時は白番・権利なし・0 手）。
    /// 失敗した場合、局面は変更されない。
    pub fn set_fen(&mut self, fen: &str) -> Result<(), FenError> {
        let mut fields = fen.split_whitespace();
        let placement = fields.next().ok_or(FenError::MissingPlacement)?;

        let mut pos = Position::empty();
        let mut rank: i32 = 7;
        let mut file: i32 = 0;
        for c in placement.chars() {
            match c {
                '/' => {
                    if file != 8 {
                        return Err(FenError::BadBoardShape);
                    }
                    rank -= 1;
                    file = 0;
                }
                '1'..='8' => file += c as i32 - '0' as i32,
                _ => {
                    let pc = Piece::from_fen_char(c).ok_or(FenError::InvalidPiece(c))?;
                    if !(0..8).contains(&file) || rank < 0 {
                        return Err(FenError::BadBoardShape);
                    }
                    pos.put_piece(pc, Square::new(file as u8, rank as u8));
                    file += 1;
                }
            }
            if file > 8 || rank < 0 {
                return Err(FenError::BadBoardShape);
            }
        }
        if rank != 0 || file != 8 {
            return Err(FenError::BadBoardShape);
        }
        if pos.count_all() > MAX_PIECES {
            return Err(FenError::TooManyPieces(pos.count_all()));
        }
        for c in Color::ALL {
            if pos.count(Piece::make(c, PieceType::King)) > 1 {
                return Err(FenError::TooManyKings(c));
            }
        }

        pos.side_to_move = match fields.next() {
            None | Some("w") => Color::White,
            Some("b") => Color::Black,
            Some(other) => return Err(FenError::InvalidSideToMove(other.to_string())),
        };

        if let Some(castling) = fields.next() {
            for c in castling.chars() {
                pos.castling |= match c {
                    'K' => WHITE_OO,
                    'Q' => WHITE_OOO,
                    'k' => BLACK_OO,
                    'q' => BLACK_OOO,
                    '-' => 0,
                    _ => {
                        return Err(FenError::InvalidField {
                            field: "castling",
                            value: castling.to_string(),
                        });
                    }
                };
            }
        }

        if let Some(ep) = fields.next() {
            pos.ep_square = match ep {
                "-" => None,
                s => Some(Square::parse(s).ok_or_else(|| FenError::InvalidField {
                    field: "en passant",
                    value: s.to_string(),
                })?),
            };
        }

        if let Some(rule50) = fields.next() {
            pos.rule50 = rule50.parse().map_err(|_| FenError::InvalidField {
                field: "halfmove clock",
                value: rule50.to_string(),
            })?;
        }

        let fullmove: i32 = match fields.next() {
            Some(s) => s.parse().map_err(|_| FenError::InvalidField {
                field: "fullmove number",
                value: s.to_string(),
            })?,
            None => 1,
        };
        pos.game_ply =
            2 * (fullmove.max(1) - 1) + i32::from(pos.side_to_move == Color::Black);

        *self = pos;
        Ok(())
    }

    /// 局面を FEN 文字列にする
    pub fn to_fen(&self) -> String {
        let mut fen = String::new();
        for rank in (0..8).rev() {
            let mut empty = 0;
            for file in 0..8 {
                let pc = self.piece_on(Square::new(file, rank));
                if pc.is_none() {
                    empty += 1;
                    continue;
                }
                if empty > 0 {
                    fen.push_str(&empty.to_string());
                    empty = 0;
                }
                fen.push(pc.to_fen_char());
            }
            if empty > 0 {
                fen.push_str(&empty.to_string());
            }
            if rank > 0 {
                fen.push('/');
            }
        }

        fen.push_str(if self.side_to_move == Color::White { " w " } else { " b " });

        if self.castling == 0 {
            fen.push('-');
        } else {
            for (bit, c) in [(WHITE_OO, 'K'), (WHITE_OOO, 'Q'), (BLACK_OO, 'k'), (BLACK_OOO, 'q')] {
                if self.castling & bit != 0 {
                    fen.push(c);
                }
            }
        }

        match self.ep_square {
            Some(sq) => fen.push_str(&format!(" {sq}")),
            None => fen.push_str(" -"),
        }
        fen.push_str(&format!(" {} {}", self.rule50, 1 + self.game_ply / 2));
        fen
    }
}
