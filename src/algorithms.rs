pub mod refinement;
