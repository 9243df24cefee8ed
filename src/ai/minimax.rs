use std::str::FromStr;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::game::{
    evaluate, Board, GameEvent, GameSession, Mark, Outcome, RuleEngine, RuleError, CELL_COUNT,
    WIN_LINES,
};

/// 默认搜索深度上限，到达后静态估值为 0。
pub const MAX_DEPTH: u8 = 4;
/// 覆盖全部 9 步的深度，等价于穷举搜索。
pub const FULL_DEPTH: u8 = CELL_COUNT as u8;
pub const WIN_SCORE: i32 = 10;

#[derive(Debug, Clone, Copy)]
struct WasmInstant {
    timestamp: f64,
}

impl WasmInstant {
    fn now() -> Self {
        Self {
            timestamp: now_ms(),
        }
    }

    fn elapsed(&self) -> Duration {
        let elapsed_ms = (now_ms() - self.timestamp).max(0.0);
        Duration::from_millis(elapsed_ms as u64)
    }
}

#[cfg(target_arch = "wasm32")]
fn now_ms() -> f64 {
    web_sys::js_sys::Date::now()
}

// 原生目标（单元测试）没有 JS 时钟。
#[cfg(not(target_arch = "wasm32"))]
fn now_ms() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64() * 1000.0)
        .unwrap_or(0.0)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AiStrategy {
    Random,
    Minimax,
}

impl FromStr for AiStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "random" => Ok(AiStrategy::Random),
            "minimax" | "search" => Ok(AiStrategy::Minimax),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AiDifficulty {
    Easy,
    #[default]
    Hard,
    Expert,
}

impl FromStr for AiDifficulty {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "easy" => Ok(AiDifficulty::Easy),
            "hard" | "normal" | "medium" => Ok(AiDifficulty::Hard),
            "expert" | "perfect" | "extreme" => Ok(AiDifficulty::Expert),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AiConfig {
    pub depth: u8,
    pub block_threats: bool,
    pub strategy: AiStrategy,
}

impl AiConfig {
    pub fn from_difficulty(difficulty: AiDifficulty) -> Self {
        match difficulty {
            AiDifficulty::Easy => Self {
                depth: 0,
                block_threats: false,
                strategy: AiStrategy::Random,
            },
            AiDifficulty::Hard => Self {
                depth: MAX_DEPTH,
                block_threats: true,
                strategy: AiStrategy::Minimax,
            },
            AiDifficulty::Expert => Self {
                depth: FULL_DEPTH,
                block_threats: true,
                strategy: AiStrategy::Minimax,
            },
        }
    }

    pub fn with_strategy(mut self, strategy: AiStrategy) -> Self {
        self.strategy = strategy;
        if strategy == AiStrategy::Minimax && self.depth == 0 {
            self.depth = MAX_DEPTH;
        }
        self
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        AiConfig::from_difficulty(AiDifficulty::default())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MoveReason {
    Block,
    Search,
    Random,
    NoMove,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiDecision {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    pub mark: Mark,
    pub evaluation: i32,
    pub reason: MoveReason,
    pub nodes: u64,
    pub depth_limit: u8,
    pub duration_ms: u64,
    pub strategy: AiStrategy,
}

/// 对手两子连线且第三格为空时返回该空格；按连线枚举顺序取第一个。
pub fn find_block(board: &Board, ai_mark: Mark) -> Option<usize> {
    let opponent = ai_mark.opponent();
    WIN_LINES.iter().find_map(|line| {
        let taken = line
            .iter()
            .filter(|&&index| board.get(index) == Some(opponent))
            .count();
        let empty = line.iter().copied().find(|&index| board.is_empty_at(index));
        if taken == 2 {
            empty
        } else {
            None
        }
    })
}

/// 先检查封堵，再做深度为 [`MAX_DEPTH`] 的极小极大搜索。满盘时返回 `None`。
pub fn select_move(board: &Board, ai_mark: Mark) -> Option<usize> {
    if let Some(index) = find_block(board, ai_mark) {
        return Some(index);
    }
    Search::new(ai_mark, MAX_DEPTH)
        .best_move(board)
        .map(|(index, _)| index)
}

/// 单次搜索的上下文。搜索只在自己的工作副本上落子并回溯。
#[derive(Debug, Clone)]
pub struct Search {
    ai_mark: Mark,
    max_depth: u8,
    nodes: u64,
}

impl Search {
    pub fn new(ai_mark: Mark, max_depth: u8) -> Self {
        Self {
            ai_mark,
            max_depth,
            nodes: 0,
        }
    }

    pub fn nodes(&self) -> u64 {
        self.nodes
    }

    /// 按索引升序尝试每个空格，分数相同时保留先出现的格子。
    pub fn best_move(&mut self, board: &Board) -> Option<(usize, i32)> {
        let mut work = *board;
        let mut best: Option<(usize, i32)> = None;

        for index in board.empty_cells() {
            work.place(index, self.ai_mark);
            let score = self.minimax(&mut work, 0, false);
            work.clear(index);

            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((index, score));
            }
        }

        best
    }

    pub fn minimax(&mut self, board: &mut Board, depth: u8, maximizing: bool) -> i32 {
        self.nodes += 1;

        match evaluate(board) {
            Outcome::Won { winner } if winner == self.ai_mark => return WIN_SCORE,
            Outcome::Won { .. } => return -WIN_SCORE,
            Outcome::Tie => return 0,
            Outcome::Ongoing => {}
        }

        if depth >= self.max_depth {
            return 0;
        }

        let mark = if maximizing {
            self.ai_mark
        } else {
            self.ai_mark.opponent()
        };
        let moves: Vec<usize> = board.empty_cells().collect();

        if maximizing {
            let mut value = i32::MIN;
            for index in moves {
                board.place(index, mark);
                let score = self.minimax(board, depth + 1, false);
                board.clear(index);
                value = value.max(score);
            }
            value
        } else {
            let mut value = i32::MAX;
            for index in moves {
                board.place(index, mark);
                let score = self.minimax(board, depth + 1, true);
                board.clear(index);
                value = value.min(score);
            }
            value
        }
    }
}

pub struct AiAgent {
    config: AiConfig,
    rng: SmallRng,
}

impl AiAgent {
    pub fn new(config: AiConfig) -> Self {
        Self {
            config,
            rng: SmallRng::from_entropy(),
        }
    }

    pub fn with_seed(config: AiConfig, seed: u64) -> Self {
        Self {
            config,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn config(&self) -> &AiConfig {
        &self.config
    }

    pub fn decide_move(&mut self, board: &Board, ai_mark: Mark) -> AiDecision {
        let start = WasmInstant::now();
        let mut decision = AiDecision {
            index: None,
            mark: ai_mark,
            evaluation: 0,
            reason: MoveReason::NoMove,
            nodes: 0,
            depth_limit: self.config.depth,
            duration_ms: 0,
            strategy: self.config.strategy,
        };

        if board.is_full() {
            decision.duration_ms = start.elapsed().as_millis() as u64;
            return decision;
        }

        match self.config.strategy {
            AiStrategy::Random => {
                let moves: Vec<usize> = board.empty_cells().collect();
                decision.index = moves.choose(&mut self.rng).copied();
                decision.reason = MoveReason::Random;
            }
            AiStrategy::Minimax => {
                let block = if self.config.block_threats {
                    find_block(board, ai_mark)
                } else {
                    None
                };

                if let Some(index) = block {
                    decision.index = Some(index);
                    decision.reason = MoveReason::Block;
                } else {
                    let mut search = Search::new(ai_mark, self.config.depth);
                    if let Some((index, score)) = search.best_move(board) {
                        decision.index = Some(index);
                        decision.evaluation = score;
                        decision.reason = MoveReason::Search;
                    }
                    decision.nodes = search.nodes();
                }
            }
        }

        decision.duration_ms = start.elapsed().as_millis() as u64;
        decision
    }

    /// 为会话中的 AI 方选一步并通过规则引擎落子。
    pub fn play_turn(
        &mut self,
        engine: &RuleEngine,
        session: &mut GameSession,
    ) -> Result<(AiDecision, Vec<GameEvent>), RuleError> {
        let ai_mark = RuleEngine::ensure_ai_turn(session)?;
        let decision = self.decide_move(&session.board, ai_mark);
        let index = decision.index.ok_or(RuleError::NoAvailableMove)?;
        let events = engine.place_mark(session, ai_mark, index)?;
        Ok((decision, events))
    }
}

impl Default for AiAgent {
    fn default() -> Self {
        AiAgent::new(AiConfig::default())
    }
}
