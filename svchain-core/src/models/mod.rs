pub mod allele;
pub mod breakend;
pub mod cluster;
pub mod linked_pair;
pub mod variant;

// re-export for cleaner imports
pub use self::allele::AlleleJcnSegment;
pub use self::breakend::{Breakend, BreakendId, ChromosomeArm, DeletionBridge};
pub use self::cluster::{FoldbackPair, ResolvedType, SvCluster};
pub use self::linked_pair::{LinkId, LinkLocation, LinkedPair};
pub use self::variant::{SvType, SvVarData};
