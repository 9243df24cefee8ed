//! AI 算法模块（封堵启发 + 极小极大搜索）。

pub mod minimax;

pub use minimax::{
    find_block, select_move, AiAgent, AiConfig, AiDecision, AiDifficulty, AiStrategy, MoveReason,
    Search, FULL_DEPTH, MAX_DEPTH, WIN_SCORE,
};
