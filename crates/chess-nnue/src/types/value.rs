//! 評価値（Value）
//!
//! 値のスケールは `MATE = 32000` を上限とし、その下に詰みスコアと
//! テーブルベーススコアの帯域を予約している。評価関数が返す値は
//! 常に `[TB_LOSS_IN_MAX_PLY + 1, TB_WIN_IN_MAX_PLY - 1]` に収まる。

/// 評価値
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Value(i32);

impl Value {
    /// ゼロ
    pub const ZERO: Value = Value(0);
    /// 引き分け
    pub const DRAW: Value = Value(0);
    /// 詰み（勝ち側の最大スコア）
    pub const MATE: Value = Value(32000);
    /// 無限大
    pub const INFINITE: Value = Value(32001);
    /// 無効値
    pub const NONE: Value = Value(32002);

    /// 探索の最大深さ
    pub const MAX_PLY: i32 = 246;

    /// 最大探索深度内での詰みスコア
    pub const MATE_IN_MAX_PLY: Value = Value(Self::MATE.0 - Self::MAX_PLY);
    /// 最大探索深度内での詰まされスコア
    pub const MATED_IN_MAX_PLY: Value = Value(-Self::MATE_IN_MAX_PLY.0);

    /// テーブルベース勝ち（詰みスコア帯の直下）
    pub const TB_WIN: Value = Value(Self::MATE_IN_MAX_PLY.0 - 1);
    /// 最大探索深度内でのテーブルベース勝ち
    pub const TB_WIN_IN_MAX_PLY: Value = Value(Self::TB_WIN.0 - Self::MAX_PLY);
    /// 最大探索深度内でのテーブルベース負け
    pub const TB_LOSS_IN_MAX_PLY: Value = Value(-Self::TB_WIN_IN_MAX_PLY.0);

    // 駒の内部評価値（中盤値）。simple eval と non-pawn material で使う
    pub const PAWN_VALUE: i32 = 208;
    pub const KNIGHT_VALUE: i32 = 781;
    pub const BISHOP_VALUE: i32 = 825;
    pub const ROOK_VALUE: i32 = 1276;
    pub const QUEEN_VALUE: i32 = 2538;

    /// `score cp` 出力時の正規化定数
    ///
    /// 内部値 328 が 100cp（勝率 50% 相当の優勢）に対応する。
    pub const NORMALIZE_TO_PAWN_VALUE: i32 = 328;

    /// 値から生成
    #[inline]
    pub const fn new(v: i32) -> Value {
        Value(v)
    }

    /// ply手で詰ますスコア
    #[inline]
    pub const fn mate_in(ply: i32) -> Value {
        Value(Self::MATE.0 - ply)
    }

    /// ply手で詰まされるスコア
    #[inline]
    pub const fn mated_in(ply: i32) -> Value {
        Value(-Self::MATE.0 + ply)
    }

    /// テーブルベース帯以上の勝ちスコアかどうか
    #[inline]
    pub const fn is_win(self) -> bool {
        self.0 >= Self::TB_WIN_IN_MAX_PLY.0
    }

    /// テーブルベース帯以下の負けスコアかどうか
    #[inline]
    pub const fn is_loss(self) -> bool {
        self.0 <= Self::TB_LOSS_IN_MAX_PLY.0
    }

    /// 生の値を取得
    #[inline]
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// 絶対値
    #[inline]
    pub const fn abs(self) -> Value {
        Value(self.0.abs())
    }

    /// 評価関数の出力範囲に丸める
    #[inline]
    pub const fn clamp_eval(self) -> Value {
        let lo = Self::TB_LOSS_IN_MAX_PLY.0 + 1;
        let hi = Self::TB_WIN_IN_MAX_PLY.0 - 1;
        if self.0 < lo {
            Value(lo)
        } else if self.0 > hi {
            Value(hi)
        } else {
            self
        }
    }

    /// 内部値を centipawn 値に変換
    #[inline]
    pub const fn to_cp(self) -> i32 {
        100 * self.0 / Self::NORMALIZE_TO_PAWN_VALUE
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::ZERO
    }
}

impl std::ops::Neg for Value {
    type Output = Value;

    #[inline]
    fn neg(self) -> Value {
        Value(-self.0)
    }
}

impl std::ops::Add for Value {
    type Output = Value;

    #[inline]
    fn add(self, rhs: Value) -> Value {
        Value(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Value {
    type Output = Value;

    #[inline]
    fn sub(self, rhs: Value) -> Value {
        Value(self.0 - rhs.0)
    }
}

impl std::ops::Mul<i32> for Value {
    type Output = Value;

    #[inline]
    fn mul(self, rhs: i32) -> Value {
        Value(self.0 * rhs)
    }
}

impl std::ops::Div<i32> for Value {
    type Output = Value;

    #[inline]
    fn div(self, rhs: i32) -> Value {
        Value(self.0 / rhs)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Value {
        Value(v)
    }
}

impl From<Value> for i32 {
    fn from(v: Value) -> i32 {
        v.0
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_constants() {
        assert_eq!(Value::MATE.raw(), 32000);
        assert_eq!(Value::MATE_IN_MAX_PLY.raw(), 31754);
        assert_eq!(Value::TB_WIN.raw(), 31753);
        assert_eq!(Value::TB_WIN_IN_MAX_PLY.raw(), 31507);
        assert_eq!(Value::TB_LOSS_IN_MAX_PLY.raw(), -31507);
    }

    #[test]
    fn test_value_clamp_eval() {
        assert_eq!(Value::MATE.clamp_eval().raw(), 31506);
        assert_eq!((-Value::MATE).clamp_eval().raw(), -31506);
        assert_eq!(Value::new(123).clamp_eval(), Value::new(123));
        assert!(!Value::MATE.clamp_eval().is_win());
        assert!(!(-Value::MATE).clamp_eval().is_loss());
    }

    #[test]
    fn test_value_mate_in() {
        let v = Value::mate_in(5);
        assert!(v.is_win());
        assert!(!v.is_loss());
        assert_eq!(Value::mated_in(3).raw(), -31997);
    }

    #[test]
    fn test_value_to_cp() {
        assert_eq!(Value::new(328).to_cp(), 100);
        assert_eq!(Value::new(-164).to_cp(), -50);
        assert_eq!(Value::new(3).to_cp(), 0);
    }

    #[test]
    fn test_value_arith() {
        let a = Value::new(100);
        let b = Value::new(50);
        assert_eq!(a + b, Value::new(150));
        assert_eq!(a - b, Value::new(50));
        assert_eq!(a * 3, Value::new(300));
        assert_eq!(a / 2, Value::new(50));
        assert_eq!(-a, Value::new(-100));
    }
}
