pub mod ai;
pub mod game;
pub mod utils;

use gloo_timers::future::TimeoutFuture;
use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use std::str::FromStr;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;
use web_sys::js_sys::Promise;

pub use ai::{
    find_block, select_move, AiAgent, AiConfig, AiDecision, AiDifficulty, AiStrategy, MoveReason,
    Search, FULL_DEPTH, MAX_DEPTH,
};
pub use game::{
    check_board, evaluate, winning_cells, winning_line, Board, Cell, GameEvent, GamePhase,
    GameSession, IntegrityError, Mark, Outcome, RuleEngine, RuleError, RuleResolution, WinLine,
    CELL_COUNT, WIN_LINES,
};

#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    utils::set_panic_hook();
}

fn to_js_error(error: RuleError) -> JsValue {
    to_value(&error).unwrap_or_else(|serialize_err| JsValue::from_str(&serialize_err.to_string()))
}

fn serde_to_js_error<E: std::fmt::Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn make_resolution_json(state: &GameSession, events: Vec<GameEvent>) -> Result<String, JsValue> {
    serde_json::to_string(&RuleResolution::new(state.clone(), events)).map_err(serde_to_js_error)
}

fn parse_mark(value: &str) -> Result<Mark, JsValue> {
    Mark::from_str(value).map_err(|_| JsValue::from_str(&format!("unknown mark: {value}")))
}

fn config_from(difficulty: Option<&str>, strategy: Option<&str>) -> AiConfig {
    let diff = difficulty
        .and_then(|value| AiDifficulty::from_str(value).ok())
        .unwrap_or_default();
    let mut config = AiConfig::from_difficulty(diff);
    if let Some(strategy) = strategy.and_then(|value| AiStrategy::from_str(value).ok()) {
        config = config.with_strategy(strategy);
    }
    config
}

fn log_decision(decision: &AiDecision) {
    match decision.index {
        Some(index) => console_log!(
            "AI {} -> {} ({:?}, score {}, {} nodes, {} ms)",
            decision.mark,
            index,
            decision.reason,
            decision.evaluation,
            decision.nodes,
            decision.duration_ms
        ),
        None => console_warn!("AI {} found no move", decision.mark),
    }
}

#[derive(Serialize)]
struct AiMoveResponse {
    decision: AiDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    applied: Option<RuleResolution>,
}

#[wasm_bindgen]
pub struct GameEngine {
    state: GameSession,
}

#[wasm_bindgen]
impl GameEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(initial_state_json: Option<String>) -> Result<GameEngine, JsValue> {
        let state = match initial_state_json {
            Some(json) => Self::parse_state(&json)?,
            None => GameSession::new(),
        };
        Ok(GameEngine { state })
    }

    fn parse_state(json: &str) -> Result<GameSession, JsValue> {
        let state: GameSession = serde_json::from_str(json).map_err(serde_to_js_error)?;
        state
            .integrity_check()
            .map_err(|error| to_js_error(RuleError::IntegrityViolation { error }))?;
        Ok(state)
    }

    #[wasm_bindgen(js_name = "stateJson")]
    pub fn state_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.state).map_err(serde_to_js_error)
    }

    #[wasm_bindgen(js_name = "setStateJson")]
    pub fn set_state_json(&mut self, json: &str) -> Result<(), JsValue> {
        self.state = Self::parse_state(json)?;
        Ok(())
    }

    #[wasm_bindgen(js_name = "isAiTurn")]
    pub fn is_ai_turn(&self) -> bool {
        self.state.is_ai_turn()
    }

    #[wasm_bindgen(js_name = "startGame")]
    pub fn start_game(&mut self, player_name: &str, player_mark: &str) -> Result<String, JsValue> {
        let mark = parse_mark(player_mark)?;
        let events = RuleEngine::new()
            .start_game(&mut self.state, player_name, mark)
            .map_err(to_js_error)?;
        console_log!("{} starts as {}", self.state.player_name, mark);
        make_resolution_json(&self.state, events)
    }

    #[wasm_bindgen(js_name = "playMove")]
    pub fn play_move(&mut self, index: usize) -> Result<String, JsValue> {
        let mark = self.state.player_mark;
        let events = RuleEngine::new()
            .place_mark(&mut self.state, mark, index)
            .map_err(to_js_error)?;
        make_resolution_json(&self.state, events)
    }

    #[wasm_bindgen(js_name = "applyAiMove")]
    pub fn apply_ai_move(
        &mut self,
        difficulty: Option<String>,
        strategy: Option<String>,
    ) -> Result<String, JsValue> {
        let config = config_from(difficulty.as_deref(), strategy.as_deref());
        let mut agent = AiAgent::new(config);
        let (decision, events) = agent
            .play_turn(&RuleEngine::new(), &mut self.state)
            .map_err(to_js_error)?;
        log_decision(&decision);

        let applied = Some(RuleResolution::new(self.state.clone(), events));
        let response = AiMoveResponse { decision, applied };
        serde_json::to_string(&response).map_err(serde_to_js_error)
    }

    /// 延迟一段时间后计算 AI 的选择，不修改当前对局。不轮到 AI 时返回被拒绝的 Promise。
    #[wasm_bindgen(js_name = "thinkAi")]
    pub fn think_ai(
        &self,
        difficulty: Option<String>,
        strategy: Option<String>,
        delay_ms: Option<u32>,
    ) -> Promise {
        let ai_mark = match RuleEngine::ensure_ai_turn(&self.state) {
            Ok(mark) => mark,
            Err(error) => return Promise::reject(&to_js_error(error)),
        };
        let board = self.state.board;
        let config = config_from(difficulty.as_deref(), strategy.as_deref());
        let delay = delay_ms.unwrap_or(0);

        future_to_promise(async move {
            if delay > 0 {
                TimeoutFuture::new(delay).await;
            }
            let mut agent = AiAgent::new(config);
            let decision = agent.decide_move(&board, ai_mark);
            log_decision(&decision);
            let json = serde_json::to_string(&decision).map_err(serde_to_js_error)?;
            Ok(JsValue::from_str(&json))
        })
    }

    pub fn reset(&mut self) -> Result<String, JsValue> {
        self.state.reset();
        console_log!("game reset");
        make_resolution_json(&self.state, vec![GameEvent::GameReset])
    }
}

/// 返回一个处于设置阶段的新对局。
#[wasm_bindgen(js_name = "createGameSession")]
pub fn create_game_session() -> Result<JsValue, JsValue> {
    to_value(&GameSession::new()).map_err(JsValue::from)
}

/// 判定棋盘：`{ type: "Ongoing" | "Won" | "Tie", winner? }`。
#[wasm_bindgen(js_name = "evaluateBoard")]
pub fn evaluate_board(board: JsValue) -> Result<JsValue, JsValue> {
    let board: Board = from_value(board).map_err(JsValue::from)?;
    to_value(&evaluate(&board)).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "winningCells")]
pub fn winning_cells_js(board: JsValue) -> Result<JsValue, JsValue> {
    let board: Board = from_value(board).map_err(JsValue::from)?;
    to_value(&winning_cells(&board)).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "validateBoard")]
pub fn validate_board(board: JsValue) -> Result<(), JsValue> {
    let board: Board = from_value(board).map_err(JsValue::from)?;
    check_board(&board).map_err(|error| to_js_error(RuleError::IntegrityViolation { error }))
}

/// 为 AI 选择落子位置。未指定难度时使用默认的封堵 + 深度受限搜索。
#[wasm_bindgen(js_name = "selectMove")]
pub fn select_move_js(
    board: JsValue,
    ai_mark: &str,
    difficulty: Option<String>,
) -> Result<usize, JsValue> {
    let board: Board = from_value(board).map_err(JsValue::from)?;
    let ai_mark = parse_mark(ai_mark)?;
    RuleEngine::ensure_playable(&board).map_err(to_js_error)?;

    let index = match difficulty {
        None => select_move(&board, ai_mark),
        Some(difficulty) => {
            let mut agent = AiAgent::new(config_from(Some(difficulty.as_str()), None));
            let decision = agent.decide_move(&board, ai_mark);
            log_decision(&decision);
            decision.index
        }
    };
    index.ok_or_else(|| to_js_error(RuleError::NoAvailableMove))
}

#[wasm_bindgen(js_name = "computeAiMove")]
pub fn compute_ai_move(
    board: JsValue,
    ai_mark: &str,
    difficulty: Option<String>,
    strategy: Option<String>,
) -> Result<JsValue, JsValue> {
    let board: Board = from_value(board).map_err(JsValue::from)?;
    let ai_mark = parse_mark(ai_mark)?;
    RuleEngine::ensure_playable(&board).map_err(to_js_error)?;
    let mut agent = AiAgent::new(config_from(difficulty.as_deref(), strategy.as_deref()));
    let decision = agent.decide_move(&board, ai_mark);
    to_value(&decision).map_err(JsValue::from)
}
