//! 游戏核心逻辑模块（棋盘、规则判定、对局会话）。

pub mod board;
pub mod rules;
pub mod state;

pub use board::{Board, Cell, Mark, WinLine, CELL_COUNT, WIN_LINES};
pub use rules::{
    evaluate, winning_cells, winning_line, Outcome, RuleEngine, RuleError, RuleResolution,
};
pub use state::{check_board, GameEvent, GamePhase, GameSession, IntegrityError};
