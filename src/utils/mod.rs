pub mod candidate_selection;
