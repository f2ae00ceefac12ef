//! Weight initialisation
//!
//! Convolution kernels are drawn from N(0, 0.02); batch-norm scales from
//! N(1, 0.02) with zero shifts. Batch-norm modules are recognised by their
//! path segment starting with `bn`.

use tch::nn::VarStore;

/// Re-initialise every parameter of a var store in place
pub fn init_weights(vs: &VarStore) {
    tch::no_grad(|| {
        for (name, mut var) in vs.variables() {
            let mut segments = name.rsplit('.');
            let leaf = segments.next().unwrap_or_default();
            let is_norm = segments.next().map(|m| m.starts_with("bn")).unwrap_or(false);

            match (leaf, is_norm) {
                ("weight", true) => {
                    let _ = var.normal_(1.0, 0.02);
                }
                ("bias", true) => {
                    let _ = var.zero_();
                }
                ("weight", false) if var.dim() >= 4 => {
                    let _ = var.normal_(0.0, 0.02);
                }
                _ => {}
            }
        }
    });
}
