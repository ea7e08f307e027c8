pub mod entry;
pub mod index;
pub mod movegen;
pub mod movement;
pub mod position;
pub mod types;

pub use entry::{
    Entry, EntryStore, EntryTransitionError, PNTM_WINS_PROPAGATION_NEEDED, STALEMATE_COUNT,
    UNKNOWN_MATE_IN,
};
pub use index::{index_to_global, index_to_local, local_to_index, max_index};
pub use movegen::{
    backward_quiet_destinations, count_forward_moves, futuremove_id, futuremove_ids,
    ForwardOutcome,
};
pub use movement::{movement_tables, MovementTables, RayStep, SelfTestError};
pub use position::{DecodeError, GlobalPosition, LocalPosition};
pub use types::{MobileList, MobileListError, PieceKind, Side, MAX_MOBILES};
