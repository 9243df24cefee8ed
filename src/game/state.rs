use serde::{Deserialize, Serialize};

use super::board::{Board, Mark, WinLine, WIN_LINES};
use super::rules::{evaluate, Outcome};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum GamePhase {
    #[default]
    Setup,
    Playing,
    Finished,
}

/// 对局事件流。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GameEvent {
    GameStarted {
        player_name: String,
        player_mark: Mark,
    },
    MarkPlaced {
        mark: Mark,
        index: usize,
        by_ai: bool,
    },
    GameWon {
        winner: Mark,
        line: WinLine,
        by_ai: bool,
    },
    GameTied,
    GameReset,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum IntegrityError {
    MarkCountImbalance { x: usize, o: usize },
    MultipleWinners,
    /// 记录的阶段与棋盘判定结果矛盾。
    PhaseMismatch { phase: GamePhase, outcome: Outcome },
}

/// 一局游戏的完整状态，由宿主页面在回合之间持有。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameSession {
    pub board: Board,
    #[serde(default)]
    pub player_name: String,
    pub player_mark: Mark,
    pub current_mark: Mark,
    pub phase: GamePhase,
    #[serde(default)]
    pub turn: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_log: Vec<GameEvent>,
}

impl GameSession {
    pub fn new() -> Self {
        Self {
            board: Board::new(),
            player_name: String::new(),
            player_mark: Mark::X,
            current_mark: Mark::X,
            phase: GamePhase::Setup,
            turn: 0,
            event_log: Vec::new(),
        }
    }

    pub fn ai_mark(&self) -> Mark {
        self.player_mark.opponent()
    }

    pub fn is_ai_turn(&self) -> bool {
        self.phase == GamePhase::Playing
            && !self.outcome().is_terminal()
            && self.current_mark == self.ai_mark()
    }

    pub fn is_finished(&self) -> bool {
        self.phase == GamePhase::Finished || self.outcome().is_terminal()
    }

    /// 结果总是从棋盘现算，不单独保存。
    pub fn outcome(&self) -> Outcome {
        evaluate(&self.board)
    }

    pub fn record_event(&mut self, event: GameEvent) {
        self.event_log.push(event);
    }

    pub fn switch_turn(&mut self) {
        self.current_mark = self.current_mark.opponent();
        self.turn += 1;
    }

    /// 回到初始设置阶段，保留事件日志中的重置记录。
    pub fn reset(&mut self) {
        *self = Self::new();
        self.record_event(GameEvent::GameReset);
    }

    /// 校验宿主交回的快照：棋盘本身合法，且阶段与棋盘结果一致。
    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        check_board(&self.board)?;

        let outcome = self.outcome();
        let consistent = match self.phase {
            GamePhase::Setup => self.board.filled() == 0,
            GamePhase::Playing => !outcome.is_terminal(),
            GamePhase::Finished => outcome.is_terminal(),
        };
        if !consistent {
            return Err(IntegrityError::PhaseMismatch {
                phase: self.phase,
                outcome,
            });
        }
        Ok(())
    }
}

impl Default for GameSession {
    fn default() -> Self {
        Self::new()
    }
}

/// 校验宿主传入的棋盘：双方子数相差不超过 1，且不能双方同时连成一线。
pub fn check_board(board: &Board) -> Result<(), IntegrityError> {
    let x = board.count(Mark::X);
    let o = board.count(Mark::O);
    if x.abs_diff(o) > 1 {
        return Err(IntegrityError::MarkCountImbalance { x, o });
    }

    let mut winners = WIN_LINES.iter().filter_map(|line| board.line_owner(line));
    if let Some(first) = winners.next() {
        if winners.any(|mark| mark != first) {
            return Err(IntegrityError::MultipleWinners);
        }
    }

    Ok(())
}
