mod support;

mod augments;
mod deviations;
mod features;
mod lifecycle;
mod load;
mod type_system;
mod uses_grouping;
