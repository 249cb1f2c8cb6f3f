//! Built-in question bank that keeps the quiz playable without an LLM.

use crate::collaborators::GeneratedQuestion;
use crate::domain::{Category, Difficulty, QuestionType};

fn mc(
  question: &str,
  options: [&str; 4],
  answer: &str,
  difficulty: Difficulty,
  category: Category,
  explanation: &str,
  image_hint: &str,
) -> GeneratedQuestion {
  GeneratedQuestion {
    question: question.into(),
    options: options.iter().map(|s| s.to_string()).collect(),
    answer: answer.into(),
    kind: QuestionType::MultipleChoice,
    difficulty,
    category,
    explanation: explanation.into(),
    image_hint: image_hint.into(),
  }
}

fn tf(
  question: &str,
  truth: bool,
  difficulty: Difficulty,
  category: Category,
  explanation: &str,
  image_hint: &str,
) -> GeneratedQuestion {
  GeneratedQuestion {
    question: question.into(),
    options: vec!["Verdadeiro".into(), "Falso".into()],
    answer: if truth { "Verdadeiro" } else { "Falso" }.into(),
    kind: QuestionType::TrueFalse,
    difficulty,
    category,
    explanation: explanation.into(),
    image_hint: image_hint.into(),
  }
}

/// Enough items across every difficulty and category for a full session.
pub fn seed_questions() -> Vec<GeneratedQuestion> {
  use Category::*;
  use Difficulty::*;
  vec![
    mc("Qual é o idioma oficial do Brasil?", ["Espanhol", "Português", "Inglês", "Francês"], "Português",
       Easy, Language, "O Brasil foi colonizado por Portugal e adotou o português como língua oficial.", "Brazil flag"),
    mc("Em que país se celebra o Diwali, o festival das luzes?", ["Índia", "México", "Egito", "Japão"], "Índia",
       Easy, Culture, "O Diwali é uma das festas mais importantes do hinduísmo, celebrada na Índia.", "oil lamps"),
    tf("O ano letivo no Japão começa em abril.", true,
       Easy, EducationSystems, "No Japão as aulas começam em abril, junto com a floração das cerejeiras.", "cherry blossom"),
    mc("Qual destes pratos é típico da Itália?", ["Sushi", "Tacos", "Risoto", "Feijoada"], "Risoto",
       Easy, Culture, "O risoto é um prato tradicional do norte da Itália.", "italian risotto"),
    tf("O mandarim é a língua materna mais falada do mundo.", true,
       Easy, Language, "O mandarim tem mais falantes nativos do que qualquer outra língua.", "chinese calligraphy"),
    mc("Qual país é famoso pelo sistema educacional sem provas padronizadas nos primeiros anos?", ["Finlândia", "Estados Unidos", "China", "Coreia do Sul"], "Finlândia",
       Medium, EducationSystems, "A Finlândia evita provas padronizadas no ensino básico e aposta na autonomia dos professores.", "finnish classroom"),
    mc("O 'Día de los Muertos' é uma tradição de qual país?", ["Espanha", "México", "Argentina", "Peru"], "México",
       Medium, Culture, "O Día de los Muertos é celebrado no México em 1º e 2 de novembro.", "sugar skull"),
    mc("Qual destas línguas usa o alfabeto cirílico?", ["Polonês", "Russo", "Húngaro", "Turco"], "Russo",
       Medium, Language, "O russo é escrito em cirílico; polonês, húngaro e turco usam o alfabeto latino.", "cyrillic letters"),
    tf("O 'Gaokao' é o exame nacional de acesso ao ensino superior da Coreia do Sul.", false,
       Medium, EducationSystems, "O Gaokao é o exame da China; na Coreia do Sul o exame se chama Suneung.", "exam hall"),
    mc("Quantos idiomas oficiais a África do Sul reconhece na constituição?", ["3", "5", "11", "20"], "11",
       Hard, Language, "A constituição sul-africana de 1996 reconheceu 11 línguas oficiais.", "south africa"),
    mc("Em qual cidade fica a universidade mais antiga em funcionamento contínuo, segundo a UNESCO?", ["Bolonha", "Fez", "Oxford", "Paris"], "Fez",
       Hard, EducationSystems, "A Universidade Al-Qarawiyyin, em Fez, no Marrocos, foi fundada em 859.", "Fez medina"),
    mc("A cerimônia do chá 'chanoyu' é associada a qual filosofia?", ["Confucionismo", "Zen-budismo", "Taoísmo", "Xintoísmo"], "Zen-budismo",
       Hard, Culture, "O chanoyu foi moldado por mestres influenciados pelo zen-budismo, como Sen no Rikyū.", "japanese tea"),
    tf("O basco é uma língua isolada, sem parentesco comprovado com outras línguas vivas.", true,
       Hard, Language, "O basco (euskara) não pertence à família indo-europeia e é considerado uma língua isolada.", "basque country"),
    tf("Na Alemanha, os alunos costumam ser encaminhados a tipos diferentes de escola por volta dos 10 anos.", true,
       Hard, EducationSystems, "Após a Grundschule, os alunos alemães seguem para Gymnasium, Realschule ou Hauptschule.", "german school"),
    mc("O tango surgiu na região do Rio da Prata, entre quais países?", ["Chile e Peru", "Argentina e Uruguai", "Brasil e Paraguai", "Bolívia e Chile"], "Argentina e Uruguai",
       Medium, Culture, "O tango nasceu no fim do século XIX em Buenos Aires e Montevidéu.", "tango dancers"),
  ]
}
