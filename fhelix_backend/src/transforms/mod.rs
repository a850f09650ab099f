//! Rewrite passes over the IR. Each pass is a visitor driven by
//! `forward_pass` or `backward_pass`; `compile` chains them into the
//! per-scheme pipelines.

mod clean_node;
mod constant_fold;
mod encode_insert;
mod mod_switch;
mod mult_depth;
mod reduction;
mod relinearize;
mod rescale;
mod rotation_keys;
mod type_infer;
mod u32_const;

pub use clean_node::clean_nodes;
pub use constant_fold::{fold_f64_constants, fold_i64_constants};
pub use encode_insert::insert_encodes;
pub use mod_switch::switch_moduli;
pub use mult_depth::count_mult_depth;
pub use reduction::{expand_reductions, reduce_chains};
pub use relinearize::insert_relinearizations;
pub use rescale::rescale_eager_waterline;
pub use rotation_keys::collect_rotation_keys;
pub use type_infer::infer_types;
pub use u32_const::{lower_u32_constants, U32Target};
