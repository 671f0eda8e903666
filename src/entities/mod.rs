// Entity Models
//
// Each entity has:
// - Stable identity that NEVER changes (dex number, game name, ability name)
// - Field values that are merged across sources over repeated runs
// - Helpers to maintain the reference sets the integrity checks rely on

pub mod ability;
pub mod creature;
pub mod game;

pub use ability::{refresh_holders, upsert_abilities, AbilityRecord};
pub use creature::{
    Appearance, BaseStats, Breeding, CreatureRecord, DexNumber, EvPoint, Evolution,
    EvolutionEdge, FieldGroup, GenderRatio, GroupValue, Identity, Known, Measure, Mechanics,
    Physical, StatKind, Unit,
};
pub use game::{upsert_games, GameRecord, GameRelease};
