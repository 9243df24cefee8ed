use serde::{Deserialize, Serialize};

use super::{
    board::{Board, Mark, WinLine, CELL_COUNT, WIN_LINES},
    state::{check_board, GameEvent, GamePhase, GameSession, IntegrityError},
};

/// 对局结果，每次都由棋盘重新计算。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "type")]
pub enum Outcome {
    #[default]
    Ongoing,
    Won {
        winner: Mark,
    },
    Tie,
}

impl Outcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Outcome::Ongoing)
    }

    pub fn winner(&self) -> Option<Mark> {
        match self {
            Outcome::Won { winner } => Some(*winner),
            _ => None,
        }
    }
}

/// 判定棋盘状态：按固定顺序扫描 8 条线，首条连线决定胜者；无连线且满盘为平局。
pub fn evaluate(board: &Board) -> Outcome {
    if let Some(line) = winning_line(board) {
        if let Some(winner) = board.line_owner(&line) {
            return Outcome::Won { winner };
        }
    }
    if board.is_full() {
        Outcome::Tie
    } else {
        Outcome::Ongoing
    }
}

pub fn winning_line(board: &Board) -> Option<WinLine> {
    WIN_LINES
        .iter()
        .find(|line| board.line_owner(line).is_some())
        .copied()
}

/// 所有获胜连线上的格子（去重、升序），供前端高亮。
pub fn winning_cells(board: &Board) -> Vec<usize> {
    let mut cells: Vec<usize> = WIN_LINES
        .iter()
        .filter(|line| board.line_owner(line).is_some())
        .flatten()
        .copied()
        .collect();
    cells.sort_unstable();
    cells.dedup();
    cells
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum RuleError {
    GameFinished,
    InvalidPhase {
        expected: GamePhase,
        actual: GamePhase,
    },
    NotPlayerTurn {
        expected: Mark,
        actual: Mark,
    },
    CellOutOfRange {
        index: usize,
    },
    CellOccupied {
        index: usize,
    },
    EmptyPlayerName,
    NoAvailableMove,
    IntegrityViolation {
        error: IntegrityError,
    },
}

impl std::fmt::Display for RuleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleError::GameFinished => write!(f, "game is already finished"),
            RuleError::InvalidPhase { expected, actual } => {
                write!(f, "expected phase {expected:?}, got {actual:?}")
            }
            RuleError::NotPlayerTurn { expected, actual } => {
                write!(f, "it is {expected}'s turn, not {actual}'s")
            }
            RuleError::CellOutOfRange { index } => write!(f, "cell {index} is out of range"),
            RuleError::CellOccupied { index } => write!(f, "cell {index} is already marked"),
            RuleError::EmptyPlayerName => write!(f, "player name must not be empty"),
            RuleError::NoAvailableMove => write!(f, "no empty cell left"),
            RuleError::IntegrityViolation { error } => write!(f, "invalid board: {error:?}"),
        }
    }
}

impl std::error::Error for RuleError {}

impl From<IntegrityError> for RuleError {
    fn from(error: IntegrityError) -> Self {
        RuleError::IntegrityViolation { error }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResolution {
    pub state: GameSession,
    pub events: Vec<GameEvent>,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub winning_cells: Vec<usize>,
}

impl RuleResolution {
    pub fn new(state: GameSession, events: Vec<GameEvent>) -> Self {
        let outcome = evaluate(&state.board);
        let winning_cells = winning_cells(&state.board);
        Self {
            state,
            events,
            outcome,
            winning_cells,
        }
    }
}

#[derive(Debug, Default)]
pub struct RuleEngine;

impl RuleEngine {
    pub fn new() -> Self {
        Self
    }

    fn ensure_phase(session: &GameSession, expected: GamePhase) -> Result<(), RuleError> {
        if session.phase != expected {
            return Err(RuleError::InvalidPhase {
                expected,
                actual: session.phase,
            });
        }
        Ok(())
    }

    fn ensure_turn_owner(session: &GameSession, mark: Mark) -> Result<(), RuleError> {
        if session.current_mark != mark {
            return Err(RuleError::NotPlayerTurn {
                expected: session.current_mark,
                actual: mark,
            });
        }
        Ok(())
    }

    /// 开局：玩家以自己选择的标记先手。
    pub fn start_game(
        &self,
        session: &mut GameSession,
        player_name: &str,
        player_mark: Mark,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_phase(session, GamePhase::Setup)?;

        let player_name = player_name.trim();
        if player_name.is_empty() {
            return Err(RuleError::EmptyPlayerName);
        }

        session.board = Board::new();
        session.player_name = player_name.to_string();
        session.player_mark = player_mark;
        session.current_mark = player_mark;
        session.phase = GamePhase::Playing;
        session.turn = 1;

        let event = GameEvent::GameStarted {
            player_name: session.player_name.clone(),
            player_mark,
        };
        session.record_event(event.clone());
        Ok(vec![event])
    }

    pub fn place_mark(
        &self,
        session: &mut GameSession,
        mark: Mark,
        index: usize,
    ) -> Result<Vec<GameEvent>, RuleError> {
        if session.is_finished() {
            return Err(RuleError::GameFinished);
        }
        Self::ensure_phase(session, GamePhase::Playing)?;
        Self::ensure_turn_owner(session, mark)?;

        if index >= CELL_COUNT {
            return Err(RuleError::CellOutOfRange { index });
        }
        if !session.board.place(index, mark) {
            return Err(RuleError::CellOccupied { index });
        }

        let by_ai = mark == session.ai_mark();
        let mut events = vec![GameEvent::MarkPlaced { mark, index, by_ai }];

        match session.outcome() {
            Outcome::Won { winner } => {
                let line = winning_line(&session.board).unwrap_or([index; 3]);
                events.push(GameEvent::GameWon {
                    winner,
                    line,
                    by_ai,
                });
                session.phase = GamePhase::Finished;
            }
            Outcome::Tie => {
                events.push(GameEvent::GameTied);
                session.phase = GamePhase::Finished;
            }
            Outcome::Ongoing => session.switch_turn(),
        }

        session.event_log.extend(events.iter().cloned());
        Ok(events)
    }

    /// 轮到 AI 落子前的校验，返回 AI 使用的标记。
    pub fn ensure_ai_turn(session: &GameSession) -> Result<Mark, RuleError> {
        if session.is_finished() {
            return Err(RuleError::GameFinished);
        }
        Self::ensure_phase(session, GamePhase::Playing)?;
        Self::ensure_playable(&session.board)?;

        let ai_mark = session.ai_mark();
        Self::ensure_turn_owner(session, ai_mark)?;
        Ok(ai_mark)
    }

    /// 对宿主直接传入的棋盘做前置校验：必须合法且仍在进行中。
    pub fn ensure_playable(board: &Board) -> Result<(), RuleError> {
        check_board(board)?;
        match evaluate(board) {
            Outcome::Ongoing => Ok(()),
            _ => Err(RuleError::GameFinished),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board(s: &str) -> Board {
        s.parse().expect("board should parse")
    }

    fn started(player_mark: Mark) -> GameSession {
        let mut session = GameSession::new();
        RuleEngine::new()
            .start_game(&mut session, "  Ada ", player_mark)
            .expect("game should start");
        session
    }

    #[test]
    fn completed_line_is_a_win_never_a_tie() {
        // 最后一格补成连线，即使满盘也判胜。
        assert_eq!(evaluate(&board("XOX OXO OXX")), Outcome::Won { winner: Mark::X });
        assert_eq!(evaluate(&board("XXX OO. ...")), Outcome::Won { winner: Mark::X });
        assert_eq!(evaluate(&board("XX. OOO X..")), Outcome::Won { winner: Mark::O });
    }

    #[test]
    fn full_board_without_line_is_tie() {
        assert_eq!(evaluate(&board("XOX XOO OXX")), Outcome::Tie);
    }

    #[test]
    fn open_board_without_line_is_ongoing() {
        assert_eq!(evaluate(&Board::new()), Outcome::Ongoing);
        assert_eq!(evaluate(&board("XOX XOO OX.")), Outcome::Ongoing);
    }

    #[test]
    fn every_line_is_detected() {
        for line in WIN_LINES {
            let mut b = Board::new();
            for index in line {
                b.place(index, Mark::O);
            }
            assert_eq!(evaluate(&b), Outcome::Won { winner: Mark::O });
            assert_eq!(winning_line(&b), Some(line));
        }
    }

    #[test]
    fn winning_cells_cover_all_lines() {
        // X 同时占据第一行和第一列。
        let b = board("XXX XOO XOO");
        assert_eq!(winning_cells(&b), vec![0, 1, 2, 3, 6]);
        assert_eq!(winning_line(&b), Some([0, 1, 2]));
    }

    #[test]
    fn start_rejects_blank_name() {
        let mut session = GameSession::new();
        let result = RuleEngine::new().start_game(&mut session, "   ", Mark::O);
        assert_eq!(result, Err(RuleError::EmptyPlayerName));
        assert_eq!(session.phase, GamePhase::Setup);
    }

    #[test]
    fn player_moves_first_with_chosen_mark() {
        let session = started(Mark::O);
        assert_eq!(session.player_name, "Ada");
        assert_eq!(session.current_mark, Mark::O);
        assert_eq!(session.ai_mark(), Mark::X);
        assert!(!session.is_ai_turn());
    }

    #[test]
    fn place_mark_validates_turn_and_cell() {
        let engine = RuleEngine::new();
        let mut session = started(Mark::X);

        assert_eq!(
            engine.place_mark(&mut session, Mark::O, 0),
            Err(RuleError::NotPlayerTurn {
                expected: Mark::X,
                actual: Mark::O
            })
        );
        assert_eq!(
            engine.place_mark(&mut session, Mark::X, 9),
            Err(RuleError::CellOutOfRange { index: 9 })
        );

        engine
            .place_mark(&mut session, Mark::X, 4)
            .expect("move should succeed");
        assert!(session.is_ai_turn());
        assert_eq!(
            engine.place_mark(&mut session, Mark::O, 4),
            Err(RuleError::CellOccupied { index: 4 })
        );
    }

    #[test]
    fn winning_move_finishes_session() {
        let engine = RuleEngine::new();
        let mut session = started(Mark::X);
        for (mark, index) in [(Mark::X, 0), (Mark::O, 3), (Mark::X, 1), (Mark::O, 4)] {
            engine
                .place_mark(&mut session, mark, index)
                .expect("move should succeed");
        }
        let events = engine
            .place_mark(&mut session, Mark::X, 2)
            .expect("move should succeed");

        assert_eq!(session.phase, GamePhase::Finished);
        assert_eq!(session.outcome(), Outcome::Won { winner: Mark::X });
        assert!(events.contains(&GameEvent::GameWon {
            winner: Mark::X,
            line: [0, 1, 2],
            by_ai: false,
        }));
        assert_eq!(
            engine.place_mark(&mut session, Mark::O, 8),
            Err(RuleError::GameFinished)
        );
    }

    #[test]
    fn won_board_rejects_moves_even_if_phase_says_playing() {
        let engine = RuleEngine::new();
        let mut session = started(Mark::O);
        session.board = board("XXX OO. ...");
        assert_eq!(session.phase, GamePhase::Playing);

        assert_eq!(
            engine.place_mark(&mut session, Mark::O, 5),
            Err(RuleError::GameFinished)
        );
        assert_eq!(session.board, board("XXX OO. ..."));
        assert_eq!(
            RuleEngine::ensure_ai_turn(&session),
            Err(RuleError::GameFinished)
        );
    }

    #[test]
    fn ensure_ai_turn_checks_phase_board_and_turn() {
        let engine = RuleEngine::new();
        assert!(matches!(
            RuleEngine::ensure_ai_turn(&GameSession::new()),
            Err(RuleError::InvalidPhase { .. })
        ));

        let mut session = started(Mark::X);
        assert_eq!(
            RuleEngine::ensure_ai_turn(&session),
            Err(RuleError::NotPlayerTurn {
                expected: Mark::X,
                actual: Mark::O
            })
        );

        engine
            .place_mark(&mut session, Mark::X, 4)
            .expect("move should succeed");
        assert_eq!(RuleEngine::ensure_ai_turn(&session), Ok(Mark::O));

        session.board = board("XX. X.. ...");
        assert!(matches!(
            RuleEngine::ensure_ai_turn(&session),
            Err(RuleError::IntegrityViolation { .. })
        ));
    }

    #[test]
    fn filling_last_cell_without_line_ties() {
        let engine = RuleEngine::new();
        let mut session = started(Mark::X);
        // X O X / X O O / O X X
        let moves = [0, 1, 2, 4, 3, 5, 7, 6, 8];
        let mut mark = Mark::X;
        let mut last = Vec::new();
        for index in moves {
            last = engine
                .place_mark(&mut session, mark, index)
                .expect("move should succeed");
            mark = mark.opponent();
        }
        assert_eq!(session.outcome(), Outcome::Tie);
        assert_eq!(session.phase, GamePhase::Finished);
        assert_eq!(last.last(), Some(&GameEvent::GameTied));
    }

    #[test]
    fn ensure_playable_rejects_terminal_boards() {
        assert_eq!(RuleEngine::ensure_playable(&Board::new()), Ok(()));
        assert_eq!(
            RuleEngine::ensure_playable(&board("XXX OO. ...")),
            Err(RuleError::GameFinished)
        );
        assert!(matches!(
            RuleEngine::ensure_playable(&board("XXX X.. ...")),
            Err(RuleError::IntegrityViolation { .. })
        ));
    }

    #[test]
    fn resolution_reports_highlight_cells() {
        let mut session = started(Mark::X);
        session.board = board("XXX OO. ...");
        let resolution = RuleResolution::new(session, Vec::new());
        assert_eq!(resolution.outcome, Outcome::Won { winner: Mark::X });
        assert_eq!(resolution.winning_cells, vec![0, 1, 2]);
    }
}
