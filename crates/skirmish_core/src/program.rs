//! Numeric unit programs.
//!
//! Players type short integer sequences on a keypad; the simulation parses
//! them once into a small instruction AST and interprets that every tick
//! instead of re-scanning raw tokens. Anything unrecognized parses to
//! [`Program::Idle`]: free-form numeric input must never raise.
//!
//! Token grammar:
//!
//! ```text
//! 6 ...        explore
//! 7 18 ...     move to own HQ
//! 7 20 ...     move to nearest discovered enemy HQ
//! 2            attack
//! p 11 c 15 t [14 e]
//!              IF c THEN t [ELSE e], preamble p as fallback action
//! c ::= 5 12   enemy unit or HQ within radius 7
//!     | 5 18   any enemy HQ within radius 5
//!     | 5 20   enemy HQ within radius 4
//! 0 0          self-destruct
//! ```

use serde::{Deserialize, Serialize};

/// Raw program token.
pub type Token = i32;

const TOK_DESTROY: Token = 0;
const TOK_ATTACK: Token = 2;
const TOK_SENSE: Token = 5;
const TOK_EXPLORE: Token = 6;
const TOK_GOTO: Token = 7;
const TOK_IF: Token = 11;
const TOK_SENSE_ENEMY: Token = 12;
const TOK_ELSE: Token = 14;
const TOK_THEN: Token = 15;
const TOK_OWN_HQ: Token = 18;
const TOK_ENEMY_HQ: Token = 20;

/// A primary unit behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Memory-guided random walk.
    Explore,
    /// Head for the owner's HQ perimeter.
    GoToOwnHq,
    /// Head for the nearest discovered enemy HQ perimeter.
    GoToEnemyHq,
    /// Engage the combat resolver.
    Attack,
}

/// A detection condition, evaluated each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Condition {
    /// Enemy unit or HQ within radius 7.
    EnemyNearby,
    /// Any enemy HQ within radius 5.
    AnyEnemyHqNearby,
    /// Enemy HQ within radius 4.
    EnemyHqClose,
}

/// A parsed program body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Routine {
    /// Unconditional behavior.
    Act(Action),
    /// Conditional behavior.
    If {
        /// Condition between IF and THEN.
        cond: Condition,
        /// Action when the condition holds.
        then: Action,
        /// Action when it doesn't, if an ELSE clause was given.
        else_: Option<Action>,
        /// Preamble action, run when the condition fails and no ELSE
        /// exists. An exploring fallback is suppressed while the unit is
        /// engaged, so it doesn't dance away from combat.
        fallback: Option<Action>,
    },
}

/// A parsed unit program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Program {
    /// Nothing to do. Also the parse of malformed input.
    Idle,
    /// The `0 0` sentinel: destroy the unit immediately.
    SelfDestruct,
    /// A runnable behavior.
    Run(Routine),
}

impl Program {
    /// Parse a raw token list.
    #[must_use]
    pub fn parse(tokens: &[Token]) -> Self {
        if tokens == [TOK_DESTROY, TOK_DESTROY] {
            return Self::SelfDestruct;
        }
        if let Some(if_at) = tokens.iter().position(|&t| t == TOK_IF) {
            return parse_conditional(tokens, if_at).map_or(Self::Idle, Self::Run);
        }
        parse_action(tokens).map_or(Self::Idle, |a| Self::Run(Routine::Act(a)))
    }
}

/// Parse a clause as a primary action.
///
/// Two-token prefixes take precedence, then an explore token anywhere,
/// then a bare attack token anywhere.
fn parse_action(tokens: &[Token]) -> Option<Action> {
    match tokens {
        [TOK_GOTO, TOK_OWN_HQ, ..] => return Some(Action::GoToOwnHq),
        [TOK_GOTO, TOK_ENEMY_HQ, ..] => return Some(Action::GoToEnemyHq),
        _ => {}
    }
    if tokens.contains(&TOK_EXPLORE) {
        return Some(Action::Explore);
    }
    if tokens.contains(&TOK_ATTACK) {
        return Some(Action::Attack);
    }
    None
}

fn parse_condition(tokens: &[Token]) -> Option<Condition> {
    match tokens {
        [TOK_SENSE, TOK_SENSE_ENEMY] => Some(Condition::EnemyNearby),
        [TOK_SENSE, TOK_OWN_HQ] => Some(Condition::AnyEnemyHqNearby),
        [TOK_SENSE, TOK_ENEMY_HQ] => Some(Condition::EnemyHqClose),
        _ => None,
    }
}

fn parse_conditional(tokens: &[Token], if_at: usize) -> Option<Routine> {
    let preamble = &tokens[..if_at];
    let rest = &tokens[if_at + 1..];
    let then_at = rest.iter().position(|&t| t == TOK_THEN)?;
    let cond = parse_condition(&rest[..then_at])?;

    let branches = &rest[then_at + 1..];
    let (then_tokens, else_tokens) = match branches.iter().position(|&t| t == TOK_ELSE) {
        Some(else_at) => (&branches[..else_at], Some(&branches[else_at + 1..])),
        None => (branches, None),
    };

    let then = parse_action(then_tokens)?;
    let else_ = else_tokens.and_then(parse_action);
    let fallback = parse_action(preamble);

    Some(Routine::If {
        cond,
        then,
        else_,
        fallback,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explore_prefix() {
        assert_eq!(Program::parse(&[6]), Program::Run(Routine::Act(Action::Explore)));
        assert_eq!(
            Program::parse(&[6, 3, 9]),
            Program::Run(Routine::Act(Action::Explore))
        );
    }

    #[test]
    fn test_goto_prefixes() {
        assert_eq!(
            Program::parse(&[7, 18]),
            Program::Run(Routine::Act(Action::GoToOwnHq))
        );
        assert_eq!(
            Program::parse(&[7, 20]),
            Program::Run(Routine::Act(Action::GoToEnemyHq))
        );
    }

    #[test]
    fn test_bare_attack() {
        assert_eq!(Program::parse(&[2]), Program::Run(Routine::Act(Action::Attack)));
        assert_eq!(
            Program::parse(&[9, 2]),
            Program::Run(Routine::Act(Action::Attack))
        );
    }

    #[test]
    fn test_explore_beats_attack_outside_conditional() {
        assert_eq!(
            Program::parse(&[6, 2]),
            Program::Run(Routine::Act(Action::Explore))
        );
    }

    #[test]
    fn test_self_destruct_sentinel() {
        assert_eq!(Program::parse(&[0, 0]), Program::SelfDestruct);
        // A lone zero is not the sentinel.
        assert_eq!(Program::parse(&[0]), Program::Idle);
    }

    #[test]
    fn test_malformed_is_idle() {
        assert_eq!(Program::parse(&[]), Program::Idle);
        assert_eq!(Program::parse(&[42, 99]), Program::Idle);
        assert_eq!(Program::parse(&[7]), Program::Idle);
        assert_eq!(Program::parse(&[7, 19]), Program::Idle);
    }

    #[test]
    fn test_if_then() {
        let p = Program::parse(&[6, 11, 5, 12, 15, 2]);
        assert_eq!(
            p,
            Program::Run(Routine::If {
                cond: Condition::EnemyNearby,
                then: Action::Attack,
                else_: None,
                fallback: Some(Action::Explore),
            })
        );
    }

    #[test]
    fn test_if_then_else() {
        let p = Program::parse(&[11, 5, 20, 15, 2, 14, 7, 18]);
        assert_eq!(
            p,
            Program::Run(Routine::If {
                cond: Condition::EnemyHqClose,
                then: Action::Attack,
                else_: Some(Action::GoToOwnHq),
                fallback: None,
            })
        );
    }

    #[test]
    fn test_hq_sense_condition() {
        let p = Program::parse(&[7, 20, 11, 5, 18, 15, 2]);
        assert_eq!(
            p,
            Program::Run(Routine::If {
                cond: Condition::AnyEnemyHqNearby,
                then: Action::Attack,
                else_: None,
                fallback: Some(Action::GoToEnemyHq),
            })
        );
    }

    #[test]
    fn test_conditional_without_then_is_idle() {
        assert_eq!(Program::parse(&[6, 11, 5, 12]), Program::Idle);
    }

    #[test]
    fn test_conditional_with_bad_condition_is_idle() {
        assert_eq!(Program::parse(&[6, 11, 5, 13, 15, 2]), Program::Idle);
    }
}
